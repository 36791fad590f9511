//! Coordinator election
//!
//! There is no voting: the coordinator is derived deterministically from
//! each membership view (first member by join order), so every member that
//! holds the same view already agrees on who it is. This module tracks role
//! transitions across view changes so a node publishes its endpoint exactly
//! when it becomes coordinator.

use crate::cluster::view::ClusterView;

/// Lifecycle of a node within the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Connecting to the group
    Joining,
    /// Waiting for the coordinator's state snapshot
    Syncing,
    /// Serving traffic
    Active,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Joining => write!(f, "joining"),
            NodeStatus::Syncing => write!(f, "syncing"),
            NodeStatus::Active => write!(f, "active"),
        }
    }
}

/// Role transition observed on a view change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleTransition {
    /// This node just became coordinator and must publish its endpoint
    BecameCoordinator,
    /// Still coordinator, nothing to do
    StillCoordinator,
    /// This node stopped being coordinator. It does not unpublish: the new
    /// coordinator's publish overwrites the registry entry (best effort
    /// during the transition window).
    LostCoordinator,
    /// Not coordinator before or after
    Follower,
}

pub struct RoleTracker {
    node_id: String,
    was_coordinator: bool,
}

impl RoleTracker {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            was_coordinator: false,
        }
    }

    pub fn is_coordinator(&self) -> bool {
        self.was_coordinator
    }

    /// Feed a new view and report the transition for this node.
    pub fn observe(&mut self, view: &ClusterView) -> RoleTransition {
        let is_now = view.coordinator() == Some(self.node_id.as_str());
        let transition = match (self.was_coordinator, is_now) {
            (false, true) => RoleTransition::BecameCoordinator,
            (true, true) => RoleTransition::StillCoordinator,
            (true, false) => RoleTransition::LostCoordinator,
            (false, false) => RoleTransition::Follower,
        };
        self.was_coordinator = is_now;
        transition
    }
}
