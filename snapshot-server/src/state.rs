use std::sync::Arc;

use snapshot_core::{BroadcastHub, RefreshTrigger, ServiceConfig, SnapshotCache};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub cache: SnapshotCache,
    pub hub: Arc<BroadcastHub>,
    pub refresh: RefreshTrigger,
}

impl AppState {
    pub fn new(
        config: ServiceConfig,
        cache: SnapshotCache,
        hub: Arc<BroadcastHub>,
        refresh: RefreshTrigger,
    ) -> Self {
        Self {
            config: Arc::new(config),
            cache,
            hub,
            refresh,
        }
    }

    pub fn owner(&self) -> &str {
        self.hub.owner()
    }
}
