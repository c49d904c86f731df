use std::sync::Arc;

use his_sync_config::HisSyncConfig;
use his_sync_scheduler::{ClientRegistry, Scheduler};
use his_sync_store::{ReplicationCache, Store};

use crate::error::CliResult;

/// Process-wide handles shared by every subcommand, built once from the
/// loaded [`HisSyncConfig`].
pub struct Context {
    pub store: Arc<Store>,
    pub cache: Arc<ReplicationCache>,
    pub clients: Arc<ClientRegistry>,
    pub scheduler: Arc<Scheduler>,
}

impl Context {
    pub fn open(config: &HisSyncConfig) -> CliResult<Self> {
        if let Some(parent) = config.database_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let store = Arc::new(Store::open(&config.database_path)?);
        let cache = Arc::new(ReplicationCache::default());
        let clients = Arc::new(ClientRegistry::new());
        let scheduler = Arc::new(Scheduler::new(store.clone(), cache.clone(), clients.clone()));
        Ok(Self { store, cache, clients, scheduler })
    }
}
