//! Group membership, transport, election, locking and discovery

pub mod election;
pub mod locks;
pub mod registry;
pub mod transport;
pub mod view;

pub use election::{NodeStatus, RoleTracker, RoleTransition};
pub use locks::{LockGuard, LockService};
pub use registry::{ServiceRegistry, DATA_SERVICE};
pub use transport::{Cluster, Envelope, EventStream, NodeEvent, NodeLink};
pub use view::ClusterView;
