//! Wire messages exchanged within the data group
//!
//! Everything crossing the transport is one `ClusterMessage`, bincode
//! encoded. Mutation messages carry the full payload (records plus content
//! bytes) so a peer can apply them against its own storage backend without
//! a read-back; acks are unicast replies keyed by operation id.

use crate::common::Result;
use crate::node::sessions::SessionRecord;
use crate::replication::state_transfer::StateSnapshot;
use crate::storage::{FileRecord, UserRecord};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    Save,
    Delete,
    Edit,
}

/// A replicated file mutation. Delete carries no content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReplication {
    pub operation_id: Uuid,
    pub operation: FileOperation,
    pub record: FileRecord,
    pub content: Option<Vec<u8>>,
}

impl FileReplication {
    pub fn save(record: FileRecord, content: Vec<u8>) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            operation: FileOperation::Save,
            record,
            content: Some(content),
        }
    }

    pub fn edit(record: FileRecord, content: Vec<u8>) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            operation: FileOperation::Edit,
            record,
            content: Some(content),
        }
    }

    pub fn delete(record: FileRecord) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            operation: FileOperation::Delete,
            record,
            content: None,
        }
    }
}

/// A replicated user registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserReplication {
    pub operation_id: Uuid,
    pub user: UserRecord,
}

impl UserReplication {
    pub fn new(user: UserRecord) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            user,
        }
    }
}

/// Unicast acknowledgement for a replicated mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationAck {
    pub operation_id: Uuid,
    pub sender_id: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Ack-free session cache update: last writer wins, no quorum tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionUpdate {
    Put(SessionRecord),
    Remove { token: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClusterMessage {
    File(FileReplication),
    User(UserReplication),
    Ack(ReplicationAck),
    Session(SessionUpdate),
    StateRequest { requester: String },
    State(Box<StateSnapshot>),
}

impl ClusterMessage {
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(bincode::serialize(self)?))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
