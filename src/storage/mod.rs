//! Per-node durable storage backend
//!
//! Each node owns one RocksDB record store (column families `users` and
//! `files`) plus an `uploads/` blob area for file bytes, referenced from
//! each file record by an opaque locator. Values are bincode-encoded.
//! RocksDB serializes concurrent writes per key; cross-record invariants
//! (unique email, check-then-insert) are guarded by store-level write locks.

pub mod files;
pub mod users;

use crate::common::Result;
use rocksdb::{Options, DB};
use std::path::Path;
use std::sync::Arc;

pub use files::{FileRecord, FileStore};
pub use users::{UserRecord, UserStore};

pub(crate) const CF_USERS: &str = "users";
pub(crate) const CF_FILES: &str = "files";

/// Open (or create) a node's record store.
pub fn open_database(path: impl AsRef<Path>) -> Result<Arc<DB>> {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.create_missing_column_families(true);

    let db = DB::open_cf(&opts, path, vec![CF_USERS, CF_FILES])?;
    Ok(Arc::new(db))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_column_families() {
        let dir = tempdir().unwrap();
        let db = open_database(dir.path().join("records.db")).unwrap();
        assert!(db.cf_handle(CF_USERS).is_some());
        assert!(db.cf_handle(CF_FILES).is_some());
    }
}
