use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::common::model::monitored_app::AppCatalog;
use crate::scheduler::tasks::collectors::karmada::fetcher::{FetchResult, WriteMode};
use crate::scheduler::tasks::collectors::karmada::task::{CycleError, MetricsCollector};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unknown application '{0}'")]
    UnknownApp(String),

    #[error("failed to fetch metrics from any pod")]
    AllFailed(Vec<String>),

    #[error(transparent)]
    Cycle(#[from] CycleError),
}

/// On-demand fetch cycle, outside the sync loops.
pub struct MetricFetchService {
    catalog: Arc<AppCatalog>,
    collector: MetricsCollector,
}

impl MetricFetchService {
    pub fn new(catalog: Arc<AppCatalog>, collector: MetricsCollector) -> Self {
        Self { catalog, collector }
    }

    pub async fn fetch(&self, app: &str) -> Result<FetchResult, FetchError> {
        let monitored = self
            .catalog
            .get(app)
            .ok_or_else(|| FetchError::UnknownApp(app.to_string()))?;

        let result = self
            .collector
            .run_cycle(monitored, &CancellationToken::new(), WriteMode::Persist)
            .await?;

        if result.snapshots.is_empty() && !result.errors.is_empty() {
            return Err(FetchError::AllFailed(result.errors));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::core::persistence::metrics::metric_write_queue::{MetricWriteQueue, WriteOutcome};
    use crate::scheduler::tasks::collectors::karmada::source::tests::MockMetricsSource;

    /// Service whose writer commits everything and records the pods it saw.
    fn service(source: MockMetricsSource) -> (MetricFetchService, Arc<Mutex<Vec<String>>>) {
        let (queue, mut rx) = MetricWriteQueue::detached(16);
        let written = Arc::new(Mutex::new(Vec::new()));
        let seen = written.clone();
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                seen.lock().unwrap().push(request.pod.clone());
                request.acknowledge(WriteOutcome::Committed(Default::default()));
            }
        });

        let collector = MetricsCollector::new(Arc::new(source), queue);
        let catalog = Arc::new(AppCatalog::build("karmada-system", &[]));
        (MetricFetchService::new(catalog, collector), written)
    }

    #[tokio::test]
    async fn all_pods_failing_is_reported_with_every_error() {
        let source = MockMetricsSource::with_local_pods(&[
            ("sched-0", "not a metric line!"),
            ("sched-1", "x{"),
        ]);
        let (service, _written) = service(source);

        match service.fetch("karmada-scheduler").await {
            Err(FetchError::AllFailed(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn successful_fetch_is_stored_before_returning() {
        let source = MockMetricsSource::with_local_pods(&[("sched-0", "# TYPE up gauge\nup 1\n")]);
        let (service, written) = service(source);

        let result = service.fetch("karmada-scheduler").await.unwrap();
        assert_eq!(result.snapshots["sched-0"].metrics["up"].metric_type, "GAUGE");
        assert!(result.errors.is_empty());
        assert_eq!(*written.lock().unwrap(), vec!["sched-0".to_string()]);
    }

    #[tokio::test]
    async fn unknown_app_is_rejected() {
        let (service, _written) = service(MockMetricsSource::default());
        assert!(matches!(
            service.fetch("nginx").await,
            Err(FetchError::UnknownApp(_))
        ));
    }
}
