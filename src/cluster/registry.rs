//! Name registry for service discovery
//!
//! Gateways find the current coordinator by looking up a well-known service
//! name. Registration is last-publish-wins: when leadership moves, the new
//! coordinator's publish simply overwrites the stale entry. A demoted node
//! does not unpublish, so the entry can briefly point at a former
//! coordinator during the transition window.

use crate::common::{Error, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// Well-known name under which the coordinator publishes its endpoint.
pub const DATA_SERVICE: &str = "data-service";

#[derive(Default)]
pub struct ServiceRegistry {
    entries: Mutex<HashMap<String, String>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or overwrite an endpoint under a service name.
    pub fn publish(&self, service: &str, endpoint: &str) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(old) = entries.insert(service.to_string(), endpoint.to_string()) {
            if old != endpoint {
                tracing::info!("Registry: '{}' rebound {} -> {}", service, old, endpoint);
            }
        } else {
            tracing::info!("Registry: '{}' bound to {}", service, endpoint);
        }
    }

    pub fn lookup(&self, service: &str) -> Option<String> {
        self.entries.lock().unwrap().get(service).cloned()
    }

    /// Lookup that treats absence as a service-unavailable condition.
    pub fn require(&self, service: &str) -> Result<String> {
        self.lookup(service)
            .ok_or_else(|| Error::MembershipUnavailable(service.to_string()))
    }
}
