use serde::Serialize;

pub const LOCAL_CLUSTER: &str = "local";
pub const AGENT_APP: &str = "karmada-agent";
pub const ESTIMATOR_PREFIX: &str = "karmada-scheduler-estimator-";

/// Where an application's pods live and how their metrics are reached.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppKind {
    /// Runs in the host cluster; scraped through the apiserver pod proxy.
    Component,
    /// Runs in every pull-mode member cluster; scraped through the cluster proxy.
    ClusterAgent,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MonitoredApp {
    pub name: String,
    pub namespace: String,
    pub port: u16,
    pub scheme: &'static str,
    pub kind: AppKind,
}

impl MonitoredApp {
    pub fn component(
        name: impl Into<String>,
        namespace: &str,
        port: u16,
        scheme: &'static str,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.to_string(),
            port,
            scheme,
            kind: AppKind::Component,
        }
    }

    pub fn label_selector(&self) -> String {
        format!("app={}", self.name)
    }

    pub fn fans_out(&self) -> bool {
        self.kind == AppKind::ClusterAgent
    }
}

/// Fixed control-plane components and their metrics endpoints.
const COMPONENTS: &[(&str, u16, &str)] = &[
    ("karmada-apiserver", 5443, "https"),
    ("karmada-aggregated-apiserver", 443, "https"),
    ("karmada-controller-manager", 8080, "http"),
    ("karmada-scheduler", 8080, "http"),
    ("karmada-descheduler", 8080, "http"),
    ("karmada-webhook", 8080, "http"),
    ("karmada-metrics-adapter", 8080, "http"),
    ("karmada-search", 443, "https"),
];

const AGENT_PORT: u16 = 8080;
const ESTIMATOR_PORT: u16 = 8080;

/// The full set of applications known at start-up.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AppCatalog {
    apps: Vec<MonitoredApp>,
}

impl AppCatalog {
    /// Components plus the agent, plus one estimator per member cluster.
    pub fn build(namespace: &str, member_clusters: &[String]) -> Self {
        let mut apps: Vec<MonitoredApp> = COMPONENTS
            .iter()
            .map(|(name, port, scheme)| MonitoredApp::component(*name, namespace, *port, *scheme))
            .collect();

        apps.push(MonitoredApp {
            name: AGENT_APP.to_string(),
            namespace: namespace.to_string(),
            port: AGENT_PORT,
            scheme: "http",
            kind: AppKind::ClusterAgent,
        });

        for cluster in member_clusters {
            apps.push(MonitoredApp::component(
                format!("{ESTIMATOR_PREFIX}{cluster}"),
                namespace,
                ESTIMATOR_PORT,
                "http",
            ));
        }

        Self { apps }
    }

    pub fn get(&self, name: &str) -> Option<&MonitoredApp> {
        self.apps.iter().find(|a| a.name == name)
    }

    pub fn apps(&self) -> &[MonitoredApp] {
        &self.apps
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.apps.iter().map(|a| a.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_adds_estimator_per_member() {
        let catalog = AppCatalog::build("karmada-system", &["member1".into(), "member2".into()]);

        let agent = catalog.get(AGENT_APP).unwrap();
        assert!(agent.fans_out());

        let estimator = catalog.get("karmada-scheduler-estimator-member2").unwrap();
        assert_eq!(estimator.kind, AppKind::Component);
        assert_eq!(estimator.label_selector(), "app=karmada-scheduler-estimator-member2");
        assert_eq!(catalog.apps().len(), COMPONENTS.len() + 3);
    }

    #[test]
    fn unknown_app_is_absent() {
        let catalog = AppCatalog::build("karmada-system", &[]);
        assert!(catalog.get("nginx").is_none());
        assert!(catalog.names().any(|n| n == "karmada-scheduler"));
    }
}
