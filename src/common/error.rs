//! Error types for replifs

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Storage Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("Corrupted record: {0}")]
    Corrupted(String),

    // === Cluster Errors ===
    #[error("Lock timeout on resource: {0}")]
    LockTimeout(String),

    #[error("No coordinator is currently published for '{0}'")]
    MembershipUnavailable(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Replication degraded: {0}")]
    ReplicationDegraded(String),

    // === Business Errors ===
    #[error("Conflict: {0}")]
    BusinessConflict(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    // === Serialization Errors ===
    #[error("Serialization error: {0}")]
    Serialization(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Convert to HTTP status code for the gateway facade
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::BusinessConflict(_) => StatusCode::CONFLICT,
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Error::LockTimeout(_) | Error::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            Error::MembershipUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}
