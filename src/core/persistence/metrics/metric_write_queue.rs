//! Single-writer persistence path.
//!
//! Every snapshot from every application goes through one bounded queue that a
//! single writer task drains. Delivery is at most once:
//! - `submit` waits for capacity but gives up when the supplied cancellation
//!   token fires first, reporting `SubmitOutcome::Dropped`.
//! - a request that reached the queue is written exactly once or rolled back.
//! - requests still queued when the writer shuts down are lost.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::metric_snapshot_entity::MetricSnapshotEntity;
use super::metric_sqlite_adapter::{write_snapshot, WriteStats};
use super::metric_store_registry::MetricStoreRegistry;

/// Result of one transactional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Committed(WriteStats),
    RolledBack { reason: String },
}

impl WriteOutcome {
    #[cfg(test)]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Enqueued,
    Dropped,
}

pub struct WriteRequest {
    pub id: Uuid,
    pub app: String,
    pub pod: String,
    pub snapshot: MetricSnapshotEntity,
    ack: Option<oneshot::Sender<WriteOutcome>>,
}

impl WriteRequest {
    pub fn new(
        app: impl Into<String>,
        pod: impl Into<String>,
        snapshot: MetricSnapshotEntity,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            app: app.into(),
            pod: pod.into(),
            snapshot,
            ack: None,
        }
    }

    /// Answers a `persist` caller without a writer behind the queue.
    #[cfg(test)]
    pub(crate) fn acknowledge(mut self, outcome: WriteOutcome) {
        if let Some(ack) = self.ack.take() {
            let _ = ack.send(outcome);
        }
    }
}

/// Producer side of the writer queue. Cheap to clone.
#[derive(Clone)]
pub struct MetricWriteQueue {
    tx: mpsc::Sender<WriteRequest>,
}

impl MetricWriteQueue {
    /// Fire-and-forget submission.
    pub async fn submit(&self, request: WriteRequest, cancel: &CancellationToken) -> SubmitOutcome {
        let (id, app, pod) = (request.id, request.app.clone(), request.pod.clone());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%id, %app, %pod, "Write dropped: cycle cancelled before enqueue");
                SubmitOutcome::Dropped
            }
            sent = self.tx.send(request) => match sent {
                Ok(()) => SubmitOutcome::Enqueued,
                Err(_) => {
                    warn!(%id, %app, %pod, "Write dropped: writer is gone");
                    SubmitOutcome::Dropped
                }
            }
        }
    }

    /// Synchronous variant: waits until the writer has committed or rolled back.
    pub async fn persist(&self, mut request: WriteRequest) -> Result<WriteOutcome> {
        let (ack_tx, ack_rx) = oneshot::channel();
        request.ack = Some(ack_tx);
        self.tx
            .send(request)
            .await
            .map_err(|_| anyhow!("metric writer is not running"))?;
        ack_rx
            .await
            .map_err(|_| anyhow!("metric writer dropped the request"))
    }

    /// Queue with no writer behind it; the receiver is handed to the caller.
    #[cfg(test)]
    pub(crate) fn detached(capacity: usize) -> (Self, mpsc::Receiver<WriteRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

/// The single consumer of the queue.
pub struct MetricWriter {
    registry: Arc<MetricStoreRegistry>,
    retention_window: u32,
    // Guards the transactional body across applications.
    commit_lock: Mutex<()>,
}

impl MetricWriter {
    /// Spawns the writer task. It stops once every queue handle is dropped.
    pub fn spawn(
        registry: Arc<MetricStoreRegistry>,
        retention_window: u32,
        capacity: usize,
    ) -> (MetricWriteQueue, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<WriteRequest>(capacity.max(1));
        let writer = Self {
            registry,
            retention_window,
            commit_lock: Mutex::new(()),
        };

        let handle = tokio::spawn(async move {
            info!(capacity, "Metric writer started");
            while let Some(mut request) = rx.recv().await {
                let outcome = writer.apply(&request).await;
                if let Some(ack) = request.ack.take() {
                    let _ = ack.send(outcome);
                }
            }
            info!("Metric writer stopped");
        });

        (MetricWriteQueue { tx }, handle)
    }

    async fn apply(&self, request: &WriteRequest) -> WriteOutcome {
        let _guard = self.commit_lock.lock().await;

        let outcome = match self.write(request).await {
            Ok(outcome) => outcome,
            Err(e) => WriteOutcome::RolledBack {
                reason: format!("{e:#}"),
            },
        };

        match &outcome {
            WriteOutcome::Committed(stats) => debug!(
                id = %request.id,
                app = %request.app,
                pod = %request.pod,
                metrics = stats.metrics_inserted,
                values = request.snapshot.value_count(),
                evicted = stats.markers_evicted,
                "Snapshot committed"
            ),
            WriteOutcome::RolledBack { reason } => error!(
                id = %request.id,
                app = %request.app,
                pod = %request.pod,
                %reason,
                "Snapshot write rolled back"
            ),
        }
        outcome
    }

    async fn write(&self, request: &WriteRequest) -> Result<WriteOutcome> {
        let pool = self.registry.writer(&request.app).await?;
        let mut tx = pool.begin().await?;

        let written =
            write_snapshot(&mut tx, &request.pod, &request.snapshot, self.retention_window).await;
        match written {
            Ok(stats) => {
                tx.commit().await?;
                Ok(WriteOutcome::Committed(stats))
            }
            Err(e) => {
                let reason = format!("{e:#}");
                if let Err(rollback) = tx.rollback().await {
                    warn!(
                        error = %rollback,
                        "Rollback failed; connection will discard the transaction"
                    );
                }
                Ok(WriteOutcome::RolledBack { reason })
            }
        }
    }
}
