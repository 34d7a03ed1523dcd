use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::exposition::parse_payload;
use super::source::{MetricsSource, PodTarget};
use crate::core::persistence::metrics::metric_snapshot_entity::MetricSnapshotEntity;
use crate::core::persistence::metrics::metric_write_queue::{
    MetricWriteQueue, SubmitOutcome, WriteOutcome, WriteRequest,
};
use crate::domain::common::model::monitored_app::MonitoredApp;

/// What one fetch produced: snapshots by pod name, and per-pod failures.
#[derive(Debug, Default, Serialize)]
pub struct FetchResult {
    pub snapshots: BTreeMap<String, MetricSnapshotEntity>,
    pub errors: Vec<String>,
}

/// How component snapshots are handed to the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Enqueue and move on.
    Submit,
    /// Wait for the writer; a rolled back write is reported as a pod error.
    Persist,
}

/// Scrapes every target concurrently, one task per pod.
///
/// Targets not yet dispatched when `cancel` fires are abandoned; scrapes already
/// running are left to finish. Component snapshots go to the writer queue
/// according to `mode`.
pub async fn fetch_metrics(
    source: Arc<dyn MetricsSource>,
    app: &MonitoredApp,
    targets: Vec<PodTarget>,
    queue: &MetricWriteQueue,
    cancel: &CancellationToken,
    mode: WriteMode,
) -> Result<FetchResult> {
    if targets.is_empty() {
        bail!("no pods to scrape for '{}'", app.name);
    }

    let snapshots = Arc::new(Mutex::new(BTreeMap::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let mut tasks = JoinSet::new();

    for target in targets {
        if cancel.is_cancelled() {
            debug!(app = %app.name, pod = %target.pod, "Cycle cancelled; remaining pods skipped");
            break;
        }

        let source = source.clone();
        let app = app.clone();
        let queue = queue.clone();
        let cancel = cancel.clone();
        let snapshots = snapshots.clone();
        let errors = errors.clone();

        tasks.spawn(async move {
            match scrape_pod(source.as_ref(), &app, &target).await {
                Ok(snapshot) => {
                    if !app.fans_out() {
                        let request = WriteRequest::new(&app.name, &target.pod, snapshot.clone());
                        if let Some(reason) = store(&queue, request, &cancel, mode).await {
                            errors
                                .lock()
                                .await
                                .push(format!("{}/{}: {reason}", target.cluster, target.pod));
                        }
                    }
                    snapshots.lock().await.insert(target.pod, snapshot);
                }
                Err(e) => {
                    warn!(
                        app = %app.name,
                        pod = %target.pod,
                        cluster = %target.cluster,
                        error = %e,
                        "Scrape failed"
                    );
                    errors
                        .lock()
                        .await
                        .push(format!("{}/{}: {e:#}", target.cluster, target.pod));
                }
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            errors.lock().await.push(format!("scrape task aborted: {e}"));
        }
    }

    let snapshots = std::mem::take(&mut *snapshots.lock().await);
    let errors = std::mem::take(&mut *errors.lock().await);
    Ok(FetchResult { snapshots, errors })
}

/// Returns why the snapshot was not stored, for durable writes only.
async fn store(
    queue: &MetricWriteQueue,
    request: WriteRequest,
    cancel: &CancellationToken,
    mode: WriteMode,
) -> Option<String> {
    let (app, pod) = (request.app.clone(), request.pod.clone());
    match mode {
        WriteMode::Submit => {
            if queue.submit(request, cancel).await == SubmitOutcome::Dropped {
                debug!(%app, %pod, "Snapshot not persisted");
            }
            None
        }
        WriteMode::Persist => match queue.persist(request).await {
            Ok(WriteOutcome::Committed(_)) => None,
            Ok(WriteOutcome::RolledBack { reason }) => Some(format!("write rolled back: {reason}")),
            Err(e) => Some(format!("{e:#}")),
        },
    }
}

async fn scrape_pod(
    source: &dyn MetricsSource,
    app: &MonitoredApp,
    target: &PodTarget,
) -> Result<MetricSnapshotEntity> {
    let payload = source.scrape(app, target).await?;
    Ok(parse_payload(&payload, Utc::now())?)
}
