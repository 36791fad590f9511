//! # replifs
//!
//! A replicated file store built on group membership:
//! - Every member keeps a full copy of users, files and sessions
//! - File mutations are broadcast and wait for acknowledgement from every peer
//! - A per-resource lock serializes concurrent writers cluster-wide
//! - The first member of the view acts as coordinator and serves state
//!   transfer to joiners
//! - HTTP gateway API, in-process group channel for coordination
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │                Cluster channel                 │
//! │  (membership views + FIFO broadcast/unicast)   │
//! └───────┬───────────────┬───────────────┬────────┘
//!         │               │               │
//! ┌───────▼─────┐  ┌──────▼──────┐  ┌─────▼───────┐
//! │ Node 1      │  │ Node 2      │  │ Node 3      │
//! │ coordinator │  │ replica     │  │ replica     │
//! │ RocksDB +   │  │ RocksDB +   │  │ RocksDB +   │
//! │ uploads/    │  │ uploads/    │  │ uploads/    │
//! └───────┬─────┘  └──────┬──────┘  └─────┬───────┘
//!         │ HTTP          │ HTTP          │ HTTP
//! ```
//!
//! ## Usage
//!
//! ### Start a group
//! ```bash
//! replifs-node serve \
//!   --nodes 3 \
//!   --base-port 7000 \
//!   --data ./replifs-data
//! ```
//!
//! ### Talk to any node
//! ```bash
//! curl -X POST localhost:7000/auth/register \
//!   -d '{"name":"ada","email":"ada@example.com","password":"pw"}'
//!
//! curl -X PUT localhost:7001/files/notes.txt \
//!   -H "Authorization: Bearer $TOKEN" --data-binary @notes.txt
//!
//! curl localhost:7002/files/notes.txt -H "Authorization: Bearer $TOKEN"
//! ```

#![allow(clippy::result_large_err)]

pub mod cluster;
pub mod common;
pub mod node;
pub mod replication;
pub mod storage;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use node::DataNode;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
