use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::{stream, FutureExt, StreamExt};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::cache::{DetailMap, SnapshotCache};
use crate::config::RefreshConfig;
use crate::error::{panic_message, FetchError, RefreshError, WorkerError};
use crate::hub::BroadcastHub;
use crate::models::Snapshot;
use crate::source::DataSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    Idle,
    Fetching,
    Backoff,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Published {
        generation: u64,
        entities: usize,
        details: usize,
    },
    Failed(RefreshError),
}

impl CycleOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, CycleOutcome::Published { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub outcome: CycleOutcome,
}

#[derive(Debug, Clone, Default)]
struct ReportState {
    last: Option<CycleReport>,
    stopped: bool,
}

#[derive(Debug)]
struct Control {
    phase: WorkerPhase,
    /// Cycles started so far; the in-flight cycle, if any, has this number.
    started: u64,
}

#[derive(Debug)]
struct Shared {
    control: Mutex<Control>,
    trigger_tx: mpsc::Sender<()>,
    reports: watch::Sender<ReportState>,
}

impl Shared {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: WorkerPhase) {
        self.control().phase = phase;
    }
}

/// Cloneable entry point for asking the worker to refresh.
#[derive(Debug, Clone)]
pub struct RefreshTrigger {
    shared: Arc<Shared>,
}

impl RefreshTrigger {
    /// Requests a cycle as soon as possible without waiting for it.
    ///
    /// Returns `true` when the request was folded into a cycle that is already
    /// running or already queued.
    pub fn trigger_now(&self) -> bool {
        let control = self.shared.control();
        if control.phase == WorkerPhase::Fetching {
            debug!(cycle = control.started, "refresh request coalesced into in-flight cycle");
            return true;
        }
        match self.shared.trigger_tx.try_send(()) {
            Ok(()) => false,
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("refresh request coalesced into pending trigger");
                true
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                warn!("refresh requested after worker exit");
                false
            }
        }
    }

    /// Requests a cycle and waits for the outcome of the cycle that satisfies it:
    /// the in-flight one if there is one, otherwise the next one to start.
    pub async fn refresh(&self) -> CycleOutcome {
        let mut reports = self.shared.reports.subscribe();
        let target = {
            let control = self.shared.control();
            if control.phase == WorkerPhase::Fetching {
                control.started
            } else {
                // Full means a request is already queued for the same next cycle.
                let _ = self.shared.trigger_tx.try_send(());
                control.started + 1
            }
        };

        loop {
            {
                let state = reports.borrow_and_update();
                if let Some(report) = state.last.as_ref().filter(|report| report.cycle >= target) {
                    return report.outcome.clone();
                }
                if state.stopped {
                    return CycleOutcome::Failed(RefreshError::Stopped);
                }
            }
            if reports.changed().await.is_err() {
                return CycleOutcome::Failed(RefreshError::Stopped);
            }
        }
    }

    pub fn phase(&self) -> WorkerPhase {
        self.shared.control().phase
    }

    /// Most recent finished cycle, if any.
    pub fn last_report(&self) -> Option<CycleReport> {
        self.shared.reports.borrow().last.clone()
    }
}

pub struct WorkerHandle {
    trigger: RefreshTrigger,
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn trigger(&self) -> RefreshTrigger {
        self.trigger.clone()
    }

    pub fn trigger_now(&self) -> bool {
        self.trigger.trigger_now()
    }

    pub async fn refresh(&self) -> CycleOutcome {
        self.trigger.refresh().await
    }

    pub fn phase(&self) -> WorkerPhase {
        self.trigger.phase()
    }

    /// Stops the loop at its next wait point; an in-flight cycle runs to completion.
    pub async fn stop(self) -> Result<(), WorkerError> {
        let _ = self.cancel_tx.send(());
        self.join.await?;
        Ok(())
    }
}

pub fn spawn_refresh_worker(
    source: Arc<dyn DataSource>,
    cache: SnapshotCache,
    hub: Arc<BroadcastHub>,
    config: RefreshConfig,
) -> WorkerHandle {
    let (cancel_tx, cancel_rx) = broadcast::channel(1);
    let (trigger_tx, trigger_rx) = mpsc::channel(1);
    let (reports, _) = watch::channel(ReportState::default());
    let shared = Arc::new(Shared {
        control: Mutex::new(Control {
            phase: WorkerPhase::Idle,
            started: 0,
        }),
        trigger_tx,
        reports,
    });

    let worker = RefreshWorker {
        source,
        cache,
        hub,
        backoff: Backoff::new(config.backoff_floor(), config.backoff_ceiling()),
        config,
        shared: Arc::clone(&shared),
    };
    let join = tokio::spawn(worker.run(trigger_rx, cancel_rx));

    WorkerHandle {
        trigger: RefreshTrigger { shared },
        cancel_tx,
        join,
    }
}

struct PublishedCycle {
    generation: u64,
    entities: usize,
    details: usize,
    snapshot: Arc<Snapshot>,
}

struct RefreshWorker {
    source: Arc<dyn DataSource>,
    cache: SnapshotCache,
    hub: Arc<BroadcastHub>,
    config: RefreshConfig,
    backoff: Backoff,
    shared: Arc<Shared>,
}

impl RefreshWorker {
    async fn run(
        mut self,
        mut trigger_rx: mpsc::Receiver<()>,
        mut cancel_rx: broadcast::Receiver<()>,
    ) {
        let mut next_due = Instant::now();
        let mut triggers_open = true;

        loop {
            tokio::select! {
                biased;
                _ = cancel_rx.recv() => {
                    info!("refresh worker shutdown requested");
                    break;
                }
                received = trigger_rx.recv(), if triggers_open => {
                    if received.is_none() {
                        triggers_open = false;
                        continue;
                    }
                    debug!("manual refresh trigger");
                }
                _ = sleep_until(next_due) => {}
            }

            let cycle = self.begin_cycle(&mut trigger_rx);
            info!(cycle, "refresh cycle started");

            let outcome = match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
                Ok(Ok(published)) => {
                    self.push(published.generation, published.snapshot).await;
                    CycleOutcome::Published {
                        generation: published.generation,
                        entities: published.entities,
                        details: published.details,
                    }
                }
                Ok(Err(err)) => CycleOutcome::Failed(err),
                Err(panic) => CycleOutcome::Failed(RefreshError::Panicked(panic_message(panic))),
            };

            match outcome {
                CycleOutcome::Published { .. } => {
                    self.backoff.reset();
                    self.shared.set_phase(WorkerPhase::Idle);
                    self.report(cycle, outcome);
                    next_due = Instant::now() + self.config.interval();
                }
                CycleOutcome::Failed(ref err) => {
                    self.cache.mark_error().await;
                    let delay = self.backoff.next_delay();
                    error!(cycle, error = %err, retry_in = ?delay, "refresh cycle failed");
                    self.shared.set_phase(WorkerPhase::Backoff);
                    self.report(cycle, outcome);

                    let cancelled = tokio::select! {
                        biased;
                        _ = cancel_rx.recv() => true,
                        _ = sleep(delay) => false,
                    };
                    self.shared.set_phase(WorkerPhase::Idle);
                    if cancelled {
                        info!("refresh worker shutdown requested during backoff");
                        break;
                    }
                    next_due = Instant::now();
                }
            }
        }

        self.shared.set_phase(WorkerPhase::Idle);
        self.shared.reports.send_modify(|state| state.stopped = true);
    }

    /// Enters `Fetching` and absorbs any triggers queued before this point: they
    /// are all satisfied by the cycle about to run.
    fn begin_cycle(&self, trigger_rx: &mut mpsc::Receiver<()>) -> u64 {
        let mut control = self.shared.control();
        control.started += 1;
        control.phase = WorkerPhase::Fetching;
        while trigger_rx.try_recv().is_ok() {}
        control.started
    }

    fn report(&self, cycle: u64, outcome: CycleOutcome) {
        self.shared.reports.send_modify(|state| {
            state.last = Some(CycleReport { cycle, outcome });
        });
    }

    async fn run_cycle(&self) -> Result<PublishedCycle, RefreshError> {
        let fetch_timeout = self.config.fetch_timeout();
        let snapshot = match timeout(fetch_timeout, self.source.fetch_snapshot()).await {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(err)) => return Err(RefreshError::Aggregate(err.to_string())),
            Err(_) => {
                return Err(RefreshError::Aggregate(
                    FetchError::Timeout(fetch_timeout).to_string(),
                ))
            }
        };

        let ids = snapshot.entity_ids();
        let details = self.fetch_details(ids.clone()).await;
        let (entities, detail_count) = (ids.len(), details.len());

        let snapshot = Arc::new(snapshot);
        let generation = self.cache.publish(Arc::clone(&snapshot), details).await;
        info!(
            generation,
            entities,
            details = detail_count,
            "refresh cycle published"
        );

        Ok(PublishedCycle {
            generation,
            entities,
            details: detail_count,
            snapshot,
        })
    }

    /// Subscriber trouble is logged and never reaches the cycle outcome.
    async fn push(&self, generation: u64, snapshot: Arc<Snapshot>) {
        let broadcast = self.hub.broadcast_snapshot(generation, snapshot);
        match AssertUnwindSafe(broadcast).catch_unwind().await {
            Ok(Ok(report)) if report.dropped > 0 => {
                info!(
                    delivered = report.delivered,
                    dropped = report.dropped,
                    "snapshot pushed, dropped failing subscribers"
                );
            }
            Ok(Ok(report)) => debug!(delivered = report.delivered, "snapshot pushed"),
            Ok(Err(err)) => warn!(error = %err, "snapshot push failed"),
            Err(panic) => error!(panic = %panic_message(panic), "snapshot push panicked"),
        }
    }

    /// Fetches every detail independently; a failed entity is left out of the map.
    async fn fetch_details(&self, ids: Vec<String>) -> DetailMap {
        let detail_timeout = self.config.detail_timeout();
        let concurrency = self.config.detail_concurrency.max(1);
        let source = &self.source;

        stream::iter(ids)
            .map(|id| async move {
                let fetch = timeout(detail_timeout, source.fetch_detail(&id));
                let result = AssertUnwindSafe(fetch).catch_unwind().await;
                (id, result)
            })
            .buffer_unordered(concurrency)
            .fold(DetailMap::new(), |mut details, (id, result)| async move {
                match result {
                    Ok(Ok(Ok(Some(detail)))) => {
                        details.insert(id, detail);
                    }
                    Ok(Ok(Ok(None))) => debug!(entity = %id, "no detail available"),
                    Ok(Ok(Err(err))) => warn!(entity = %id, error = %err, "detail fetch failed"),
                    Ok(Err(_)) => warn!(entity = %id, timeout = ?detail_timeout, "detail fetch timed out"),
                    Err(panic) => {
                        warn!(entity = %id, panic = %panic_message(panic), "detail fetch panicked")
                    }
                }
                details
            })
            .await
    }
}
