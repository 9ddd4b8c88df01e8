use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{EntityDetail, Snapshot};

pub type DetailMap = HashMap<String, EntityDetail>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    WarmingUp,
    Ready,
    Error,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::WarmingUp => "warming_up",
            CacheStatus::Ready => "ready",
            CacheStatus::Error => "error",
        }
    }
}

/// Point-in-time copy of the cache state.
///
/// `snapshot` and `details` always come from the same publish.
#[derive(Debug, Clone)]
pub struct CacheView {
    pub status: CacheStatus,
    pub snapshot: Option<Arc<Snapshot>>,
    pub details: Arc<DetailMap>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Number of successful publishes so far; 0 while warming up.
    pub generation: u64,
}

impl Default for CacheView {
    fn default() -> Self {
        Self {
            status: CacheStatus::WarmingUp,
            snapshot: None,
            details: Arc::new(DetailMap::new()),
            updated_at: None,
            generation: 0,
        }
    }
}

impl CacheView {
    pub fn is_ready(&self) -> bool {
        self.snapshot.is_some()
    }
}

/// Last known-good snapshot plus its detail map.
///
/// The lock only ever guards a swap or a copy of a few `Arc`s, so readers never
/// wait on a refresh in progress.
#[derive(Debug, Clone, Default)]
pub struct SnapshotCache {
    inner: Arc<RwLock<CacheView>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read(&self) -> CacheView {
        self.inner.read().await.clone()
    }

    pub async fn status(&self) -> CacheStatus {
        self.inner.read().await.status
    }

    pub async fn detail(&self, id: &str) -> Option<EntityDetail> {
        let details = Arc::clone(&self.inner.read().await.details);
        details.get(id).cloned()
    }

    /// Replaces snapshot and details together and returns the new generation.
    pub async fn publish(&self, snapshot: impl Into<Arc<Snapshot>>, details: DetailMap) -> u64 {
        let snapshot = snapshot.into();
        let details = Arc::new(details);
        let now = Utc::now();

        let mut state = self.inner.write().await;
        state.generation += 1;
        state.snapshot = Some(snapshot);
        state.details = details;
        state.updated_at = Some(now);
        state.status = CacheStatus::Ready;
        let generation = state.generation;
        drop(state);

        debug!(generation, "cache published");
        generation
    }

    /// Flags the last refresh as failed; previously published data stays readable.
    pub async fn mark_error(&self) {
        self.inner.write().await.status = CacheStatus::Error;
    }
}
