use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::fetcher::{fetch_metrics, FetchResult, WriteMode};
use super::locator::locate_pods;
use super::source::MetricsSource;
use crate::core::persistence::metrics::metric_write_queue::MetricWriteQueue;
use crate::domain::common::model::monitored_app::MonitoredApp;

#[derive(Debug, Error)]
pub enum CycleError {
    /// Nothing to scrape and discovery reported problems.
    #[error("pod discovery failed: {}", .0.join("; "))]
    Discovery(Vec<String>),

    #[error(transparent)]
    Fetch(#[from] anyhow::Error),
}

/// One discover-scrape-enqueue pass for an application.
#[derive(Clone)]
pub struct MetricsCollector {
    source: Arc<dyn MetricsSource>,
    queue: MetricWriteQueue,
}

impl MetricsCollector {
    pub fn new(source: Arc<dyn MetricsSource>, queue: MetricWriteQueue) -> Self {
        Self { source, queue }
    }

    pub async fn run_cycle(
        &self,
        app: &MonitoredApp,
        cancel: &CancellationToken,
        mode: WriteMode,
    ) -> Result<FetchResult, CycleError> {
        let location = locate_pods(self.source.as_ref(), app).await;
        for error in &location.errors {
            warn!(app = %app.name, %error, "Pod discovery error");
        }

        if location.is_empty() {
            if !location.errors.is_empty() {
                return Err(CycleError::Discovery(location.errors));
            }
            debug!(app = %app.name, "No pods found");
            return Ok(FetchResult::default());
        }

        let discovery_errors = location.errors.clone();
        let mut result = fetch_metrics(
            self.source.clone(),
            app,
            location.into_targets(),
            &self.queue,
            cancel,
            mode,
        )
        .await?;

        result.errors.splice(0..0, discovery_errors);
        debug!(
            app = %app.name,
            snapshots = result.snapshots.len(),
            errors = result.errors.len(),
            "Fetch cycle finished"
        );
        Ok(result)
    }
}
