//! Session cache with JWT tokens
//!
//! Sessions ride the same broadcast primitive as file and user mutations,
//! but in its ack-free form: updates are fire-and-forget, last writer wins,
//! and nobody waits for acknowledgements. Tokens are HS256 JWTs signed with
//! the group-shared secret, so any member can validate a token issued by
//! any other member even before the cache update arrives.

use crate::common::{Error, Result};
use crate::common::utils::timestamp_now_millis;
use crate::storage::UserRecord;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub token: String,
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub created_at: u64,
    pub expires_at: u64,
}

impl SessionRecord {
    pub fn is_expired(&self) -> bool {
        timestamp_now_millis() >= self.expires_at
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    name: String,
    email: String,
    iat: u64,
    exp: u64,
}

pub struct SessionManager {
    secret: Vec<u8>,
    ttl: Duration,
    cache: Mutex<HashMap<String, SessionRecord>>,
}

impl SessionManager {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            secret: secret.to_vec(),
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a token for a logged-in user and cache the session locally.
    /// The caller broadcasts the returned record to the rest of the group.
    pub fn create(&self, user: &UserRecord) -> Result<SessionRecord> {
        let now = timestamp_now_millis();
        let expires_at = now + self.ttl.as_millis() as u64;

        let claims = Claims {
            sub: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            iat: now / 1000,
            exp: expires_at / 1000,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| Error::Auth(e.to_string()))?;

        let record = SessionRecord {
            token: token.clone(),
            user_id: user.id.clone(),
            username: user.name.clone(),
            email: user.email.clone(),
            created_at: now,
            expires_at,
        };

        self.cache
            .lock()
            .unwrap()
            .insert(token, record.clone());
        Ok(record)
    }

    /// Validate a token: it must be in the cache, unexpired, and carry a
    /// valid signature.
    pub fn validate(&self, token: &str) -> Option<SessionRecord> {
        let record = self.cache.lock().unwrap().get(token).cloned()?;
        if record.is_expired() {
            return None;
        }

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::default(),
        )
        .ok()?;

        Some(record)
    }

    /// Apply a replicated session update (or a state-transfer entry).
    pub fn insert(&self, record: SessionRecord) {
        self.cache
            .lock()
            .unwrap()
            .insert(record.token.clone(), record);
    }

    /// Remove a session (logout). Returns the record if it existed.
    pub fn remove(&self, token: &str) -> Option<SessionRecord> {
        self.cache.lock().unwrap().remove(token)
    }

    /// Snapshot of every cached session, for state transfer.
    pub fn all(&self) -> Vec<SessionRecord> {
        self.cache.lock().unwrap().values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserRecord {
        UserRecord {
            id: "u1".into(),
            name: "Alice".into(),
            credential: "secret".into(),
            email: "alice@example.com".into(),
            created_at: 1000,
        }
    }

    #[test]
    fn test_create_and_validate() {
        let manager = SessionManager::new(b"super-secret", Duration::from_secs(60));
        let record = manager.create(&alice()).unwrap();

        let validated = manager.validate(&record.token).unwrap();
        assert_eq!(validated.user_id, "u1");
        assert_eq!(validated.email, "alice@example.com");
    }

    #[test]
    fn test_unknown_token_rejected() {
        let manager = SessionManager::new(b"super-secret", Duration::from_secs(60));
        assert!(manager.validate("not-a-token").is_none());
    }

    #[test]
    fn test_foreign_session_validates_with_shared_secret() {
        // Two members sharing a secret: a token issued by one validates on
        // the other once the cache update is applied.
        let issuer = SessionManager::new(b"shared", Duration::from_secs(60));
        let peer = SessionManager::new(b"shared", Duration::from_secs(60));

        let record = issuer.create(&alice()).unwrap();
        peer.insert(record.clone());
        assert!(peer.validate(&record.token).is_some());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = SessionManager::new(b"secret-a", Duration::from_secs(60));
        let peer = SessionManager::new(b"secret-b", Duration::from_secs(60));

        let record = issuer.create(&alice()).unwrap();
        peer.insert(record.clone());
        assert!(peer.validate(&record.token).is_none());
    }

    #[test]
    fn test_remove_revokes() {
        let manager = SessionManager::new(b"super-secret", Duration::from_secs(60));
        let record = manager.create(&alice()).unwrap();

        assert!(manager.remove(&record.token).is_some());
        assert!(manager.validate(&record.token).is_none());
        assert!(manager.remove(&record.token).is_none());
        assert_eq!(manager.count(), 0);
    }
}
