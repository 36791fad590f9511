//! User records
//!
//! Keyed by user id; email is unique across the store. Registration is
//! check-then-insert under a store-level write lock, which is what gives
//! two concurrent registrations of the same email exactly one winner.

use crate::common::{Error, Result};
use crate::storage::CF_USERS;
use rocksdb::DB;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub credential: String,
    pub email: String,
    pub created_at: u64,
}

impl UserRecord {
    /// Copy with the credential stripped, for returning to callers.
    pub fn sanitized(&self) -> UserRecord {
        UserRecord {
            credential: String::new(),
            ..self.clone()
        }
    }
}

pub struct UserStore {
    db: Arc<DB>,
    // Serializes register/upsert so the email uniqueness check and the
    // insert are one atomic step.
    write_lock: Mutex<()>,
}

impl UserStore {
    pub fn new(db: Arc<DB>) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
        }
    }

    /// Register a new user. Returns false when the email is already in use
    /// (a business outcome, not a system fault).
    pub fn register(
        &self,
        user_id: &str,
        name: &str,
        credential: &str,
        email: &str,
        created_at: u64,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap();

        if self.find_by_email(email)?.is_some() {
            return Ok(false);
        }

        let record = UserRecord {
            id: user_id.to_string(),
            name: name.to_string(),
            credential: credential.to_string(),
            email: email.to_string(),
            created_at,
        };
        self.put(&record)?;
        Ok(true)
    }

    /// Upsert used by the replication and state-transfer paths: if the email
    /// already exists the existing record keeps its id and takes the
    /// incoming name and credential, mirroring the on-conflict behavior of
    /// the registration constraint.
    pub fn upsert(&self, record: &UserRecord) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();

        match self.find_by_email(&record.email)? {
            Some(existing) if existing.id != record.id => {
                let merged = UserRecord {
                    name: record.name.clone(),
                    credential: record.credential.clone(),
                    ..existing
                };
                self.put(&merged)
            }
            _ => self.put(record),
        }
    }

    fn put(&self, record: &UserRecord) -> Result<()> {
        let cf = self
            .db
            .cf_handle(CF_USERS)
            .ok_or_else(|| Error::Internal("missing users column family".into()))?;
        let value = bincode::serialize(record)?;
        self.db.put_cf(cf, record.id.as_bytes(), value)?;
        Ok(())
    }

    pub fn find_by_id(&self, user_id: &str) -> Result<Option<UserRecord>> {
        let cf = self
            .db
            .cf_handle(CF_USERS)
            .ok_or_else(|| Error::Internal("missing users column family".into()))?;
        match self.db.get_cf(cf, user_id.as_bytes())? {
            Some(bytes) => {
                let record: UserRecord = bincode::deserialize(&bytes)
                    .map_err(|e| Error::Corrupted(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        Ok(self.find_all()?.into_iter().find(|u| u.email == email))
    }

    /// Credential check for login. Returns the record with the credential
    /// still present; callers strip it before handing it out.
    pub fn login(&self, email: &str, credential: &str) -> Result<Option<UserRecord>> {
        Ok(self
            .find_by_email(email)?
            .filter(|u| u.credential == credential))
    }

    /// All users in stable (id) order, as RocksDB iterates keys sorted.
    pub fn find_all(&self) -> Result<Vec<UserRecord>> {
        let cf = self
            .db
            .cf_handle(CF_USERS)
            .ok_or_else(|| Error::Internal("missing users column family".into()))?;
        let iter = self.db.iterator_cf(cf, rocksdb::IteratorMode::Start);

        let mut users = Vec::new();
        for item in iter {
            let (_, value) = item?;
            let record: UserRecord =
                bincode::deserialize(&value).map_err(|e| Error::Corrupted(e.to_string()))?;
            users.push(record);
        }
        Ok(users)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.find_all()?.len())
    }
}
