use anyhow::Result;
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::debug;

use crate::core::client::kube_resources::{cluster_resource, DynamicObject};

/// Registered member clusters with their sync mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberCluster {
    pub name: String,
    pub sync_mode: String,
}

impl MemberCluster {
    pub fn is_pull(&self) -> bool {
        self.sync_mode == "Pull"
    }
}

/// Fetch every `Cluster` object registered with Karmada.
pub async fn fetch_member_clusters(karmada: &Client) -> Result<Vec<MemberCluster>> {
    let resource = cluster_resource();
    let api: Api<DynamicObject> = Api::all_with(karmada.clone(), &resource);
    let list = api.list(&ListParams::default()).await?;

    let clusters: Vec<MemberCluster> = list.items.iter().filter_map(to_member_cluster).collect();
    debug!("Discovered {} member cluster(s)", clusters.len());
    Ok(clusters)
}

/// Names of the clusters that pull their workloads (agent-managed).
pub async fn fetch_pull_cluster_names(karmada: &Client) -> Result<Vec<String>> {
    let clusters = fetch_member_clusters(karmada).await?;
    Ok(clusters
        .into_iter()
        .filter(MemberCluster::is_pull)
        .map(|c| c.name)
        .collect())
}

fn to_member_cluster(obj: &DynamicObject) -> Option<MemberCluster> {
    let name = obj.metadata.name.clone()?;
    let sync_mode = obj
        .data
        .get("spec")
        .and_then(|spec| spec.get("syncMode"))
        .and_then(|mode| mode.as_str())
        .unwrap_or_default()
        .to_string();
    Some(MemberCluster { name, sync_mode })
}
