pub mod backoff;
pub mod cache;
pub mod config;
pub mod error;
pub mod hub;
pub mod models;
pub mod source;
pub mod worker;

pub use backoff::Backoff;
pub use cache::{CacheStatus, CacheView, DetailMap, SnapshotCache};
pub use config::{HubConfig, RefreshConfig, ServerConfig, ServiceConfig, SourceConfig};
pub use error::{ConfigError, FetchError, HubError, RefreshError, WorkerError};
pub use hub::{
    channel_connection, BroadcastHub, BroadcastReport, ChannelConnection, PushConnection,
    PushFrame, SubscriberId,
};
pub use models::{EntityDetail, IndexQuote, PivotLevels, Snapshot, StockSummary, ThemeSummary};
pub use source::{DataSource, HttpSource};
pub use worker::{
    spawn_refresh_worker, CycleOutcome, CycleReport, RefreshTrigger, WorkerHandle, WorkerPhase,
};
