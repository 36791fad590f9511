//! File records and blob storage
//!
//! A file record is keyed by `(user_id, file_name)` and points at a blob in
//! the node's `uploads/` area through an opaque locator (a UUID basename).
//! Locators are node-local: replicas store the same basename under their own
//! uploads directory, so the locator travels in replication messages while
//! the full path never leaves the node.

use crate::common::{Error, Result};
use crate::common::utils::timestamp_now_millis;
use crate::storage::CF_FILES;
use rocksdb::DB;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub user_id: String,
    pub user_name: String,
    pub file_name: String,
    pub locator: String,
    pub created_at: u64,
    pub updated_at: u64,
    pub size: u64,
}

pub struct FileStore {
    db: Arc<DB>,
    uploads: PathBuf,
    // Serializes check-then-write sequences on the record table.
    write_lock: Mutex<()>,
}

// Record keys embed a NUL between user id and file name so they sort
// stably and never collide with either component.
fn record_key(user_id: &str, file_name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(user_id.len() + file_name.len() + 1);
    key.extend_from_slice(user_id.as_bytes());
    key.push(0);
    key.extend_from_slice(file_name.as_bytes());
    key
}

impl FileStore {
    pub fn new(db: Arc<DB>, uploads: impl Into<PathBuf>) -> Result<Self> {
        let uploads = uploads.into();
        fs::create_dir_all(&uploads)?;
        Ok(Self {
            db,
            uploads,
            write_lock: Mutex::new(()),
        })
    }

    fn blob_path(&self, locator: &str) -> PathBuf {
        self.uploads.join(locator)
    }

    /// Save (create or overwrite) a file owned by `user_id`. Existing
    /// records keep their creation time and locator; new records get a
    /// fresh UUID locator.
    pub fn save(
        &self,
        user_id: &str,
        user_name: &str,
        file_name: &str,
        content: &[u8],
    ) -> Result<FileRecord> {
        let _guard = self.write_lock.lock().unwrap();
        let now = timestamp_now_millis();

        let record = match self.get_record(user_id, file_name)? {
            Some(existing) => FileRecord {
                user_name: user_name.to_string(),
                updated_at: now,
                size: content.len() as u64,
                ..existing
            },
            None => FileRecord {
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                file_name: file_name.to_string(),
                locator: Uuid::new_v4().to_string(),
                created_at: now,
                updated_at: now,
                size: content.len() as u64,
            },
        };

        fs::write(self.blob_path(&record.locator), content)?;
        self.put_record(&record)?;
        tracing::debug!("File saved: {} -> {}", file_name, record.locator);
        Ok(record)
    }

    /// Apply a replicated save (or a state-transfer entry): reuse the
    /// originator's locator for the local blob and take its timestamps.
    pub fn apply_replica(&self, record: &FileRecord, content: &[u8]) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        fs::write(self.blob_path(&record.locator), content)?;
        self.put_record(record)?;
        tracing::debug!("File replicated: {} -> {}", record.file_name, record.locator);
        Ok(())
    }

    /// Edit an existing file in place. `NotFound` if the record is absent.
    pub fn edit(&self, user_id: &str, file_name: &str, content: &[u8]) -> Result<FileRecord> {
        let _guard = self.write_lock.lock().unwrap();

        let existing = self.get_record(user_id, file_name)?.ok_or_else(|| {
            Error::NotFound(format!("file '{}' for user '{}'", file_name, user_id))
        })?;

        let record = FileRecord {
            updated_at: timestamp_now_millis(),
            size: content.len() as u64,
            ..existing
        };

        fs::write(self.blob_path(&record.locator), content)?;
        self.put_record(&record)?;
        tracing::debug!("File edited: {}", file_name);
        Ok(record)
    }

    /// Delete a file and its blob, returning the removed record.
    /// `NotFound` if the record is absent.
    pub fn delete(&self, user_id: &str, file_name: &str) -> Result<FileRecord> {
        let _guard = self.write_lock.lock().unwrap();

        let record = self.get_record(user_id, file_name)?.ok_or_else(|| {
            Error::NotFound(format!("file '{}' for user '{}'", file_name, user_id))
        })?;

        let blob = self.blob_path(&record.locator);
        if blob.exists() {
            fs::remove_file(blob)?;
        }

        let cf = self.cf()?;
        self.db.delete_cf(cf, record_key(user_id, file_name))?;
        tracing::debug!("File deleted: {}", file_name);
        Ok(record)
    }

    /// Idempotent delete used by the replication path: a missing record is
    /// not an error on a replica that never saw the file.
    pub fn apply_delete(&self, user_id: &str, file_name: &str) -> Result<()> {
        match self.delete(user_id, file_name) {
            Ok(_) => Ok(()),
            Err(Error::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Read the content bytes for a file, or None if the record is absent.
    pub fn read(&self, user_id: &str, file_name: &str) -> Result<Option<Vec<u8>>> {
        match self.get_record(user_id, file_name)? {
            Some(record) => {
                let blob = self.blob_path(&record.locator);
                if blob.exists() {
                    Ok(Some(fs::read(blob)?))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    pub fn get_record(&self, user_id: &str, file_name: &str) -> Result<Option<FileRecord>> {
        let cf = self.cf()?;
        match self.db.get_cf(cf, record_key(user_id, file_name))? {
            Some(bytes) => {
                let record: FileRecord = bincode::deserialize(&bytes)
                    .map_err(|e| Error::Corrupted(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// File names owned by one user, in stable order.
    pub fn list_user_files(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self
            .all_records()?
            .into_iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.file_name)
            .collect())
    }

    /// Cluster-wide search by file name across all users.
    pub fn find_by_name(&self, file_name: &str) -> Result<Vec<FileRecord>> {
        Ok(self
            .all_records()?
            .into_iter()
            .filter(|r| r.file_name == file_name)
            .collect())
    }

    /// All records in stable key order.
    pub fn all_records(&self) -> Result<Vec<FileRecord>> {
        let cf = self.cf()?;
        let iter = self.db.iterator_cf(cf, rocksdb::IteratorMode::Start);

        let mut records = Vec::new();
        for item in iter {
            let (_, value) = item?;
            let record: FileRecord =
                bincode::deserialize(&value).map_err(|e| Error::Corrupted(e.to_string()))?;
            records.push(record);
        }
        Ok(records)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.all_records()?.len())
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(CF_FILES)
            .ok_or_else(|| Error::Internal("missing files column family".into()))
    }

    fn put_record(&self, record: &FileRecord) -> Result<()> {
        let cf = self.cf()?;
        let value = bincode::serialize(record)?;
        self.db
            .put_cf(cf, record_key(&record.user_id, &record.file_name), value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::open_database;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempdir().unwrap();
        let db = open_database(dir.path().join("records.db")).unwrap();
        let files = FileStore::new(db, dir.path().join("uploads")).unwrap();
        (dir, files)
    }

    #[test]
    fn test_save_and_read() {
        let (_dir, files) = store();
        let record = files.save("u1", "Alice", "a.txt", b"hello").unwrap();
        assert_eq!(record.size, 5);

        let content = files.read("u1", "a.txt").unwrap().unwrap();
        assert_eq!(content, b"hello");
        assert!(files.read("u1", "missing.txt").unwrap().is_none());
    }

    #[test]
    fn test_resave_keeps_locator_and_created_at() {
        let (_dir, files) = store();
        let first = files.save("u1", "Alice", "a.txt", b"v1").unwrap();
        let second = files.save("u1", "Alice", "a.txt", b"longer-v2").unwrap();

        assert_eq!(first.locator, second.locator);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.size, 9);
        assert_eq!(files.read("u1", "a.txt").unwrap().unwrap(), b"longer-v2");
        assert_eq!(files.count().unwrap(), 1);
    }

    #[test]
    fn test_edit_absent_is_not_found() {
        let (_dir, files) = store();
        let err = files.edit("u1", "a.txt", b"v1").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_delete_removes_record_and_blob() {
        let (_dir, files) = store();
        let record = files.save("u1", "Alice", "a.txt", b"hello").unwrap();
        let blob = files.blob_path(&record.locator);
        assert!(blob.exists());

        files.delete("u1", "a.txt").unwrap();
        assert!(!blob.exists());
        assert!(files.read("u1", "a.txt").unwrap().is_none());

        let err = files.delete("u1", "a.txt").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        // Replica-side delete of an absent file is a no-op
        files.apply_delete("u1", "a.txt").unwrap();
    }

    #[test]
    fn test_apply_replica_reuses_locator() {
        let (_dir, origin) = store();
        let (_dir2, replica) = store();

        let record = origin.save("u1", "Alice", "a.txt", b"hello").unwrap();
        replica.apply_replica(&record, b"hello").unwrap();

        let copied = replica.get_record("u1", "a.txt").unwrap().unwrap();
        assert_eq!(copied.locator, record.locator);
        assert_eq!(copied.created_at, record.created_at);
        assert_eq!(replica.read("u1", "a.txt").unwrap().unwrap(), b"hello");
    }

    #[test]
    fn test_list_and_search() {
        let (_dir, files) = store();
        files.save("u1", "Alice", "a.txt", b"1").unwrap();
        files.save("u1", "Alice", "b.txt", b"2").unwrap();
        files.save("u2", "Bob", "a.txt", b"3").unwrap();

        assert_eq!(files.list_user_files("u1").unwrap(), vec!["a.txt", "b.txt"]);
        assert_eq!(files.list_user_files("u3").unwrap(), Vec::<String>::new());

        let hits = files.find_by_name("a.txt").unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().any(|r| r.user_id == "u2"));
    }
}
