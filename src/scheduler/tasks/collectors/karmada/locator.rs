use std::collections::BTreeMap;

use futures::future::join_all;
use tracing::debug;

use super::source::{MetricsSource, PodTarget};
use crate::domain::common::model::monitored_app::{AppKind, MonitoredApp, LOCAL_CLUSTER};

/// Targets per cluster, plus whatever went wrong while looking for them.
#[derive(Debug, Default)]
pub struct PodLocation {
    pub targets: BTreeMap<String, Vec<PodTarget>>,
    pub errors: Vec<String>,
}

impl PodLocation {
    pub fn target_count(&self) -> usize {
        self.targets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.target_count() == 0
    }

    pub fn into_targets(self) -> Vec<PodTarget> {
        self.targets.into_values().flatten().collect()
    }
}

/// Resolves the pods of `app`. Never fails as a whole: per-cluster failures
/// land in `errors` and the other clusters are still resolved.
pub async fn locate_pods(source: &dyn MetricsSource, app: &MonitoredApp) -> PodLocation {
    let mut location = PodLocation::default();

    match app.kind {
        AppKind::ClusterAgent => {
            let clusters = match source.pull_clusters().await {
                Ok(clusters) => clusters,
                Err(e) => {
                    location.errors.push(format!("failed to list member clusters: {e:#}"));
                    return location;
                }
            };

            let lookups = clusters.iter().map(|cluster| async move {
                (cluster.as_str(), source.member_pods(cluster, app).await)
            });
            for (cluster, result) in join_all(lookups).await {
                match result {
                    Ok(pods) => add_targets(&mut location, cluster, pods),
                    Err(e) => location
                        .errors
                        .push(format!("failed to list pods in cluster {cluster}: {e:#}")),
                }
            }
        }
        AppKind::Component => match source.local_pods(app).await {
            Ok(pods) => add_targets(&mut location, LOCAL_CLUSTER, pods),
            Err(e) => location.errors.push(format!("failed to list local pods: {e:#}")),
        },
    }

    debug!(
        app = %app.name,
        targets = location.target_count(),
        errors = location.errors.len(),
        "Located pods"
    );
    location
}

fn add_targets(location: &mut PodLocation, cluster: &str, pods: Vec<String>) {
    if pods.is_empty() {
        return;
    }
    let targets = pods.into_iter().map(|pod| PodTarget::new(pod, cluster)).collect();
    location.targets.insert(cluster.to_string(), targets);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::common::model::monitored_app::AppCatalog;
    use crate::scheduler::tasks::collectors::karmada::source::tests::MockMetricsSource;

    fn agent() -> MonitoredApp {
        AppCatalog::build("karmada-system", &[])
            .get("karmada-agent")
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn agent_pods_span_clusters_and_tolerate_failures() {
        let mut source = MockMetricsSource::default();
        source.clusters = vec!["member1".into(), "member2".into(), "member3".into()];
        source.pods.insert("member1".into(), vec!["karmada-agent-a".into()]);
        source.pods.insert("member3".into(), vec!["karmada-agent-c".into()]);
        source.failing_clusters = vec!["member2".into()];

        let location = locate_pods(&source, &agent()).await;

        assert_eq!(location.target_count(), 2);
        assert_eq!(
            location.targets["member3"],
            vec![PodTarget::new("karmada-agent-c", "member3")]
        );
        assert_eq!(location.errors.len(), 1);
        assert!(location.errors[0].contains("member2"));
    }

    #[tokio::test]
    async fn cluster_listing_failure_is_reported() {
        let source = MockMetricsSource {
            cluster_listing_fails: true,
            ..Default::default()
        };

        let location = locate_pods(&source, &agent()).await;
        assert!(location.is_empty());
        assert_eq!(location.errors.len(), 1);
    }

    #[tokio::test]
    async fn component_pods_are_keyed_under_local() {
        let source = MockMetricsSource::with_local_pods(&[("sched-0", ""), ("sched-1", "")]);
        let app = AppCatalog::build("karmada-system", &[])
            .get("karmada-scheduler")
            .cloned()
            .unwrap();

        let location = locate_pods(&source, &app).await;
        assert!(location.errors.is_empty());
        assert_eq!(location.targets.keys().collect::<Vec<_>>(), vec![LOCAL_CLUSTER]);
        assert_eq!(location.into_targets().len(), 2);
    }
}
