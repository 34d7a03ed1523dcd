use anyhow::Result;
use async_trait::async_trait;
use kube::Client;

use crate::core::client::clusters::fetch_pull_cluster_names;
use crate::core::client::pods::{
    fetch_member_pod_metrics, fetch_member_pods_by_label, fetch_pod_metrics, fetch_pods_by_label,
    pod_names,
};
use crate::domain::common::model::monitored_app::{AppKind, MonitoredApp};

/// A pod to scrape and the cluster that runs it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PodTarget {
    pub pod: String,
    pub cluster: String,
}

impl PodTarget {
    pub fn new(pod: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            pod: pod.into(),
            cluster: cluster.into(),
        }
    }
}

/// Everything the collectors need from the clusters.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Member clusters registered in `Pull` sync mode.
    async fn pull_clusters(&self) -> Result<Vec<String>>;

    /// Pod names of `app` in a member cluster.
    async fn member_pods(&self, cluster: &str, app: &MonitoredApp) -> Result<Vec<String>>;

    /// Pod names of `app` in the host cluster.
    async fn local_pods(&self, app: &MonitoredApp) -> Result<Vec<String>>;

    /// Raw `/metrics` payload of one pod.
    async fn scrape(&self, app: &MonitoredApp, target: &PodTarget) -> Result<Vec<u8>>;
}

/// Live implementation over the host and Karmada apiservers.
pub struct KubeMetricsSource {
    host: Client,
    karmada: Client,
}

impl KubeMetricsSource {
    pub fn new(host: Client, karmada: Client) -> Self {
        Self { host, karmada }
    }
}

#[async_trait]
impl MetricsSource for KubeMetricsSource {
    async fn pull_clusters(&self) -> Result<Vec<String>> {
        fetch_pull_cluster_names(&self.karmada).await
    }

    async fn member_pods(&self, cluster: &str, app: &MonitoredApp) -> Result<Vec<String>> {
        let selector = app.label_selector();
        let pods =
            fetch_member_pods_by_label(&self.karmada, cluster, &app.namespace, &selector).await?;
        Ok(pod_names(pods))
    }

    async fn local_pods(&self, app: &MonitoredApp) -> Result<Vec<String>> {
        let pods = fetch_pods_by_label(&self.host, &app.namespace, &app.label_selector()).await?;
        Ok(pod_names(pods))
    }

    async fn scrape(&self, app: &MonitoredApp, target: &PodTarget) -> Result<Vec<u8>> {
        match app.kind {
            AppKind::ClusterAgent => {
                fetch_member_pod_metrics(
                    &self.karmada,
                    &target.cluster,
                    &app.namespace,
                    &target.pod,
                    app.port,
                )
                .await
            }
            AppKind::Component => {
                fetch_pod_metrics(&self.host, &app.namespace, app.scheme, &target.pod, app.port)
                    .await
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory source: pods per cluster, payloads per pod, failures by name.
    #[derive(Default)]
    pub(crate) struct MockMetricsSource {
        pub clusters: Vec<String>,
        pub pods: HashMap<String, Vec<String>>,
        pub payloads: HashMap<String, String>,
        pub failing_clusters: Vec<String>,
        pub cluster_listing_fails: bool,
        pub scraped: Mutex<Vec<String>>,
    }

    impl MockMetricsSource {
        pub(crate) fn with_local_pods(pods: &[(&str, &str)]) -> Self {
            let mut source = Self::default();
            for (pod, payload) in pods {
                source
                    .pods
                    .entry("local".to_string())
                    .or_default()
                    .push(pod.to_string());
                source.payloads.insert(pod.to_string(), payload.to_string());
            }
            source
        }

        pub(crate) fn scraped(&self) -> Vec<String> {
            self.scraped.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MetricsSource for MockMetricsSource {
        async fn pull_clusters(&self) -> Result<Vec<String>> {
            if self.cluster_listing_fails {
                return Err(anyhow!("clusters.cluster.karmada.io is forbidden"));
            }
            Ok(self.clusters.clone())
        }

        async fn member_pods(&self, cluster: &str, _app: &MonitoredApp) -> Result<Vec<String>> {
            if self.failing_clusters.iter().any(|c| c == cluster) {
                return Err(anyhow!("cluster {cluster} is unreachable"));
            }
            Ok(self.pods.get(cluster).cloned().unwrap_or_default())
        }

        async fn local_pods(&self, _app: &MonitoredApp) -> Result<Vec<String>> {
            Ok(self.pods.get("local").cloned().unwrap_or_default())
        }

        async fn scrape(&self, _app: &MonitoredApp, target: &PodTarget) -> Result<Vec<u8>> {
            self.scraped.lock().unwrap().push(target.pod.clone());
            self.payloads
                .get(&target.pod)
                .map(|p| p.clone().into_bytes())
                .ok_or_else(|| anyhow!("connection refused"))
        }
    }
}
