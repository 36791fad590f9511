//! Join-time state transfer
//!
//! A node that joins an existing group (anyone but the coordinator of its
//! first view) requests a full snapshot from the current coordinator before
//! serving traffic: every user record, then every file record paired with
//! its content bytes in stable key order, then the live session cache.
//! The joiner applies users first, then files, through the same save paths
//! normal replication uses, so storage invariants are exercised identically.
//! Coordinators never request state.

use crate::common::Result;
use crate::node::sessions::SessionRecord;
use crate::storage::{FileRecord, FileStore, UserRecord, UserStore};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub users: Vec<UserRecord>,
    pub files: Vec<FileEntry>,
    pub sessions: Vec<SessionRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub record: FileRecord,
    pub content: Vec<u8>,
}

impl StateSnapshot {
    /// Serialize the provider's full data set. Records whose blob went
    /// missing on disk are skipped rather than aborting the transfer.
    pub fn build(
        users: &UserStore,
        files: &FileStore,
        sessions: Vec<SessionRecord>,
    ) -> Result<Self> {
        let user_records = users.find_all()?;

        let mut entries = Vec::new();
        for record in files.all_records()? {
            match files.read(&record.user_id, &record.file_name)? {
                Some(content) => entries.push(FileEntry { record, content }),
                None => tracing::warn!(
                    "State transfer: blob missing for {}, skipping",
                    record.file_name
                ),
            }
        }

        tracing::info!(
            "State snapshot built: {} users, {} files, {} sessions",
            user_records.len(),
            entries.len(),
            sessions.len()
        );

        Ok(Self {
            users: user_records,
            files: entries,
            sessions,
        })
    }

    /// Apply a received snapshot: users first, then files. Individual
    /// failures are logged and skipped; live replication eventually fills
    /// the gaps.
    pub fn apply(&self, users: &UserStore, files: &FileStore) -> (usize, usize) {
        let mut applied_users = 0;
        for user in &self.users {
            match users.upsert(user) {
                Ok(()) => applied_users += 1,
                Err(e) => tracing::warn!("State transfer: user {} failed: {}", user.email, e),
            }
        }

        let mut applied_files = 0;
        for entry in &self.files {
            match files.apply_replica(&entry.record, &entry.content) {
                Ok(()) => applied_files += 1,
                Err(e) => {
                    tracing::warn!("State transfer: file {} failed: {}", entry.record.file_name, e)
                }
            }
        }

        tracing::info!(
            "State applied: {}/{} users, {}/{} files",
            applied_users,
            self.users.len(),
            applied_files,
            self.files.len()
        );
        (applied_users, applied_files)
    }
}
