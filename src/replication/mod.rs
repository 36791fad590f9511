//! Mutation replication: message formats, ack tracking, state transfer

pub mod coordinator;
pub mod messages;
pub mod state_transfer;

pub use coordinator::ReplicationCoordinator;
pub use messages::{
    ClusterMessage, FileOperation, FileReplication, ReplicationAck, SessionUpdate, UserReplication,
};
pub use state_transfer::{FileEntry, StateSnapshot};
