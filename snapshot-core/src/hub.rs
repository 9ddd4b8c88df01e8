use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::error::{panic_message, HubError};
use crate::models::Snapshot;

pub type SubscriberId = u64;

/// Outbound half of one push connection.
#[async_trait]
pub trait PushConnection: Send + Sync + 'static {
    async fn send_text(&self, frame: Arc<str>) -> Result<(), HubError>;
}

/// Connection backed by a bounded queue; the receiving end is drained by the
/// task that owns the actual socket.
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    tx: mpsc::Sender<Arc<str>>,
}

pub fn channel_connection(buffer: usize) -> (ChannelConnection, mpsc::Receiver<Arc<str>>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (ChannelConnection { tx }, rx)
}

#[async_trait]
impl PushConnection for ChannelConnection {
    async fn send_text(&self, frame: Arc<str>) -> Result<(), HubError> {
        self.tx.send(frame).await.map_err(|_| HubError::Closed)
    }
}

/// JSON frames pushed to subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushFrame {
    Hello {
        owner: String,
        ts: i64,
    },
    Snapshot {
        seq: u64,
        ts: i64,
        owner: String,
        data: Arc<Snapshot>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Live set of push subscribers.
///
/// The membership lock is held only to insert, remove or copy the member list;
/// every send happens outside it.
pub struct BroadcastHub {
    members: Mutex<HashMap<SubscriberId, Arc<dyn PushConnection>>>,
    next_id: AtomicU64,
    send_timeout: Duration,
    owner: String,
}

impl BroadcastHub {
    pub fn new(owner: impl Into<String>, send_timeout: Duration) -> Self {
        Self {
            members: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            send_timeout,
            owner: owner.into(),
        }
    }

    pub fn from_config(owner: impl Into<String>, config: &HubConfig) -> Self {
        Self::new(owner, config.send_timeout())
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Greets the connection, then registers it. A connection that cannot take
    /// the greeting is never registered.
    pub async fn subscribe(&self, conn: Arc<dyn PushConnection>) -> Result<SubscriberId, HubError> {
        let hello = PushFrame::Hello {
            owner: self.owner.clone(),
            ts: Utc::now().timestamp(),
        };
        let text: Arc<str> = serde_json::to_string(&hello)?.into();
        self.send_with_timeout(conn.as_ref(), text).await?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let count = {
            let mut members = self.members.lock().await;
            members.insert(id, conn);
            members.len()
        };
        info!(subscriber = id, subscribers = count, "push subscriber connected");
        Ok(id)
    }

    /// Safe to call repeatedly; returns whether the id was still registered.
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.members.lock().await.remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "push subscriber removed");
        }
        removed
    }

    pub async fn subscriber_count(&self) -> usize {
        self.members.lock().await.len()
    }

    pub async fn broadcast_snapshot(
        &self,
        seq: u64,
        snapshot: Arc<Snapshot>,
    ) -> Result<BroadcastReport, HubError> {
        let frame = PushFrame::Snapshot {
            seq,
            ts: Utc::now().timestamp(),
            owner: self.owner.clone(),
            data: snapshot,
        };
        self.broadcast(&frame).await
    }

    /// Serializes `frame` once and sends it to every current member.
    ///
    /// Members whose send fails or times out are dropped afterwards.
    pub async fn broadcast(&self, frame: &PushFrame) -> Result<BroadcastReport, HubError> {
        let text: Arc<str> = serde_json::to_string(frame)?.into();
        let targets: Vec<(SubscriberId, Arc<dyn PushConnection>)> = {
            let members = self.members.lock().await;
            members
                .iter()
                .map(|(id, conn)| (*id, Arc::clone(conn)))
                .collect()
        };
        if targets.is_empty() {
            return Ok(BroadcastReport::default());
        }

        let sends = targets.iter().map(|(id, conn)| {
            let text = Arc::clone(&text);
            async move {
                match self.send_with_timeout(conn.as_ref(), text).await {
                    Ok(()) => None,
                    Err(err) => {
                        warn!(subscriber = *id, error = %err, "push send failed");
                        Some(*id)
                    }
                }
            }
        });
        let dead: Vec<SubscriberId> = join_all(sends).await.into_iter().flatten().collect();

        if !dead.is_empty() {
            let mut members = self.members.lock().await;
            for id in &dead {
                members.remove(id);
            }
        }

        Ok(BroadcastReport {
            delivered: targets.len() - dead.len(),
            dropped: dead.len(),
        })
    }

    /// Bounded by `send_timeout`; a panicking connection counts as a failed send.
    async fn send_with_timeout(
        &self,
        conn: &dyn PushConnection,
        text: Arc<str>,
    ) -> Result<(), HubError> {
        let send = tokio::time::timeout(self.send_timeout, conn.send_text(text));
        match AssertUnwindSafe(send).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(HubError::Timeout(self.send_timeout)),
            Err(panic) => Err(HubError::Panicked(panic_message(panic))),
        }
    }
}
