//! Per-process HTTP client cache.
//!
//! spec.md §5: "Per-destination HTTP clients should be reused (connection
//! pool) across monitor tasks targeting the same destination." One
//! [`HttpDhis2Client`](his_sync_client::HttpDhis2Client) is built per
//! [`Instance`] and shared by every monitor task that references it,
//! whether as a source or a destination.

use std::sync::Arc;

use dashmap::DashMap;
use his_sync_client::{Dhis2Client, Endpoint, HttpDhis2Client};
use his_sync_store::{Instance, InstanceId};

#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<InstanceId, Arc<dyn Dhis2Client>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, instance: &Instance) -> Arc<dyn Dhis2Client> {
        if let Some(client) = self.clients.get(&instance.id) {
            return client.clone();
        }
        let endpoint = Endpoint::new(instance.base_url.clone(), instance.username.clone(), instance.password.clone());
        let client: Arc<dyn Dhis2Client> = Arc::new(HttpDhis2Client::new(endpoint));
        self.clients.insert(instance.id, client.clone());
        client
    }

    /// Drops a cached client, e.g. after an `Instance`'s credentials or
    /// base URL change.
    pub fn evict(&self, instance_id: InstanceId) {
        self.clients.remove(&instance_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_the_same_client_for_repeated_lookups() {
        let registry = ClientRegistry::new();
        let instance = Instance::new("src", "https://a/api", "u", "p", true, false).unwrap();
        let first = registry.get_or_create(&instance);
        let second = registry.get_or_create(&instance);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn eviction_forces_a_fresh_client() {
        let registry = ClientRegistry::new();
        let instance = Instance::new("src", "https://a/api", "u", "p", true, false).unwrap();
        let first = registry.get_or_create(&instance);
        registry.evict(instance.id);
        let second = registry.get_or_create(&instance);
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
