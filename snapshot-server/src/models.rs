use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use snapshot_core::{CacheStatus, CycleOutcome, CycleReport, Snapshot, WorkerPhase};

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub ts: i64,
    pub owner: String,
    pub status: CacheStatus,
    pub phase: WorkerPhase,
    pub subscribers: usize,
    pub last_cycle: Option<LastCycle>,
}

/// Outcome of the most recent finished refresh cycle.
#[derive(Debug, Clone, Serialize)]
pub struct LastCycle {
    pub cycle: u64,
    pub published: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<CycleReport> for LastCycle {
    fn from(report: CycleReport) -> Self {
        match report.outcome {
            CycleOutcome::Published { generation, .. } => Self {
                cycle: report.cycle,
                published: true,
                generation: Some(generation),
                error: None,
            },
            CycleOutcome::Failed(err) => Self {
                cycle: report.cycle,
                published: false,
                generation: None,
                error: Some(err.to_string()),
            },
        }
    }
}

/// Body of `GET /snapshot`; `Empty` is the not-ready indicator.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SnapshotResponse {
    Empty {
        status: CacheStatus,
        ts: i64,
        owner: String,
    },
    Snapshot {
        seq: u64,
        ts: i64,
        owner: String,
        status: CacheStatus,
        updated_at: Option<DateTime<Utc>>,
        data: Arc<Snapshot>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshResponse {
    pub ok: bool,
    pub ts: i64,
    pub coalesced: bool,
}
