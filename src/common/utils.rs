//! Utility functions for replifs

use std::time::{SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp (milliseconds)
pub fn timestamp_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// Resource key for the distributed lock and storage uniqueness:
/// `userId:fileName` as in the lock service of the data cluster.
pub fn resource_key(user_id: &str, file_name: &str) -> String {
    format!("{}:{}", user_id, file_name)
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}

/// Validate a file name (must be non-empty, no control chars, no path separators)
pub fn validate_file_name(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(crate::Error::InvalidConfig(
            "file name cannot be empty".into(),
        ));
    }

    if name.len() > 1024 {
        return Err(crate::Error::InvalidConfig(
            "file name too long (max 1024 bytes)".into(),
        ));
    }

    if name.chars().any(|c| c.is_control()) || name.contains('/') || name.contains('\\') {
        return Err(crate::Error::InvalidConfig(
            "file name contains invalid characters".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_key() {
        assert_eq!(resource_key("u1", "a.txt"), "u1:a.txt");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
    }

    #[test]
    fn test_validate_file_name() {
        assert!(validate_file_name("report.pdf").is_ok());
        assert!(validate_file_name("").is_err());
        assert!(validate_file_name("a/b.txt").is_err());
        assert!(validate_file_name(&"x".repeat(2000)).is_err());
    }

    #[test]
    fn test_timestamp_monotonic_enough() {
        let a = timestamp_now_millis();
        let b = timestamp_now_millis();
        assert!(b >= a);
    }
}
