#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use snapshot_core::{
    spawn_refresh_worker, BroadcastHub, DataSource, EntityDetail, FetchError, HubError,
    PushConnection, RefreshConfig, Snapshot, SnapshotCache, StockSummary, WorkerHandle,
    WorkerPhase,
};
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// What the next aggregate fetch does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Ok,
    Fail,
    Hang,
    Panic,
}

pub struct ScriptedSource {
    ids: Vec<String>,
    script: Mutex<VecDeque<Step>>,
    failing_details: HashSet<String>,
    missing_details: HashSet<String>,
    hanging_details: HashSet<String>,
    gate: Option<Arc<Semaphore>>,
    aggregate_calls: AtomicUsize,
    detail_calls: AtomicUsize,
    call_times: Mutex<Vec<Instant>>,
}

impl ScriptedSource {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            script: Mutex::new(VecDeque::new()),
            failing_details: HashSet::new(),
            missing_details: HashSet::new(),
            hanging_details: HashSet::new(),
            gate: None,
            aggregate_calls: AtomicUsize::new(0),
            detail_calls: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
        }
    }

    /// Aggregate outcomes in call order; once exhausted every fetch succeeds.
    pub fn with_script(self, steps: &[Step]) -> Self {
        *self.script.lock().unwrap() = steps.iter().copied().collect();
        self
    }

    pub fn failing_detail(mut self, id: &str) -> Self {
        self.failing_details.insert(id.to_string());
        self
    }

    pub fn missing_detail(mut self, id: &str) -> Self {
        self.missing_details.insert(id.to_string());
        self
    }

    pub fn hanging_detail(mut self, id: &str) -> Self {
        self.hanging_details.insert(id.to_string());
        self
    }

    /// Every aggregate fetch waits for one permit from `gate`.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn push_step(&self, step: Step) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn aggregate_calls(&self) -> usize {
        self.aggregate_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataSource for ScriptedSource {
    async fn fetch_snapshot(&self) -> Result<Snapshot, FetchError> {
        let call = self.aggregate_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.call_times.lock().unwrap().push(Instant::now());
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Ok);
        match step {
            Step::Ok => Ok(snapshot_with(&self.ids, &format!("call-{call}"))),
            Step::Fail => Err(FetchError::Other("upstream unavailable".into())),
            Step::Hang => std::future::pending().await,
            Step::Panic => panic!("parser blew up"),
        }
    }

    async fn fetch_detail(&self, id: &str) -> Result<Option<EntityDetail>, FetchError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.hanging_details.contains(id) {
            std::future::pending::<()>().await;
        }
        if self.failing_details.contains(id) {
            return Err(FetchError::Other(format!("detail page for {id} unavailable")));
        }
        if self.missing_details.contains(id) {
            return Ok(None);
        }
        Ok(Some(detail(id)))
    }
}

/// Takes the greeting, then panics on every later frame.
#[derive(Default)]
pub struct PanickingConnection {
    frames: AtomicUsize,
}

#[async_trait]
impl PushConnection for PanickingConnection {
    async fn send_text(&self, _frame: Arc<str>) -> Result<(), HubError> {
        if self.frames.fetch_add(1, Ordering::SeqCst) > 0 {
            panic!("socket writer bug");
        }
        Ok(())
    }
}

pub fn stock(code: &str) -> StockSummary {
    StockSummary {
        code: code.to_string(),
        name: format!("stock {code}"),
        market: "KOSPI".into(),
        price: 10_000,
        change: 500,
        change_pct: 5.26,
        volume: 1_000_000,
        trade_value: 10_000_000_000,
        link: None,
        score: 70,
        signals: Vec::new(),
        opinion: None,
    }
}

pub fn snapshot_with(ids: &[String], source: &str) -> Snapshot {
    Snapshot {
        indices: Vec::new(),
        themes: Vec::new(),
        stocks: ids.iter().map(|id| stock(id)).collect(),
        source: source.to_string(),
        generated_at: Utc::now(),
    }
}

pub fn detail(id: &str) -> EntityDetail {
    EntityDetail {
        code: id.to_string(),
        name: format!("stock {id}"),
        price: 10_000,
        change: 500,
        change_pct: 5.26,
        volume: 1_000_000,
        trade_value: 10_000_000_000,
        market: "KOSPI".into(),
        pivot: None,
        prev_high: None,
        prev_low: None,
        prev_close: None,
        news: Vec::new(),
        financials: BTreeMap::new(),
        investor_trends: Vec::new(),
    }
}

pub fn test_config() -> RefreshConfig {
    RefreshConfig {
        interval_secs: 60,
        fetch_timeout_secs: 3_600,
        detail_timeout_secs: 5,
        backoff_floor_secs: 1,
        backoff_ceiling_secs: 300,
        detail_concurrency: 2,
    }
}

pub struct Harness {
    pub cache: SnapshotCache,
    pub hub: Arc<BroadcastHub>,
    pub worker: WorkerHandle,
}

pub fn start(source: Arc<ScriptedSource>, config: RefreshConfig) -> Harness {
    let cache = SnapshotCache::new();
    let hub = Arc::new(BroadcastHub::new("tester", Duration::from_secs(1)));
    let worker = spawn_refresh_worker(source, cache.clone(), Arc::clone(&hub), config);
    Harness { cache, hub, worker }
}

pub async fn wait_for_phase(worker: &WorkerHandle, phase: WorkerPhase) {
    for _ in 0..10_000 {
        if worker.phase() == phase {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("worker never reached {phase:?}");
}

pub async fn wait_for_calls(source: &ScriptedSource, calls: usize) {
    for _ in 0..10_000 {
        if source.aggregate_calls() >= calls {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("source never reached {calls} aggregate calls");
}
