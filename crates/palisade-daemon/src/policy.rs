//! A simple in-memory policy resolver.
//!
//! Admits workloads on the configured target networks and keeps the public
//! keys registered for peer nodes. Real deployments substitute their own
//! [`PolicyResolver`] implementation at assembly time.

use std::collections::HashMap;
use std::sync::Mutex;

use palisade_core::monitor::{PolicyDecision, PolicyResolver, WorkloadRuntime};
use palisade_core::Result;
use tracing::{debug, info};

/// Tag that marks a workload as explicitly denied.
pub const DENY_TAG: &str = "palisade/deny";

/// Network-scoped allow-by-default resolver with a node key registry.
pub struct NetworkPolicyResolver {
    networks: Vec<String>,
    keys: Mutex<HashMap<String, Vec<u8>>>,
}

impl NetworkPolicyResolver {
    /// Create a resolver for the given target networks.
    pub fn new(networks: Vec<String>) -> Self {
        Self {
            networks,
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// The certificate PEM registered for a node, if any.
    pub fn registered_key(&self, node_id: &str) -> Option<Vec<u8>> {
        self.keys.lock().ok()?.get(node_id).cloned()
    }
}

impl PolicyResolver for NetworkPolicyResolver {
    fn resolve(&self, node_id: &str, runtime: &WorkloadRuntime) -> PolicyDecision {
        if runtime.tags.contains_key(DENY_TAG) {
            info!(node = node_id, workload = %runtime.name, "workload denied by tag");
            return PolicyDecision::Deny;
        }
        debug!(
            node = node_id,
            workload = %runtime.name,
            networks = ?self.networks,
            "workload admitted"
        );
        PolicyDecision::Allow
    }

    fn register_public_key(&self, node_id: &str, cert_pem: &[u8]) -> Result<()> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|_| palisade_core::CoreError::Registration("key registry poisoned".into()))?;
        keys.insert(node_id.to_string(), cert_pem.to_vec());
        Ok(())
    }
}
