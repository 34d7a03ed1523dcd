use anyhow::{anyhow, Result};
use http::{Method, Request as HttpRequest};
use kube::api::ListParams;
use kube::{Api, Client};
use serde::Deserialize;
use tracing::debug;

use crate::core::client::kube_resources::{cluster_proxy_path, Pod};

#[derive(Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

/// Fetch pods in a namespace filtered by label selector (e.g. "app=karmada-scheduler")
pub async fn fetch_pods_by_label(
    client: &Client,
    namespace: &str,
    label_selector: &str,
) -> Result<Vec<Pod>> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let lp = ListParams::default().labels(label_selector);
    let pod_list = pods.list(&lp).await?;

    debug!(
        "Found {} pod(s) with label '{}' in '{}'",
        pod_list.items.len(),
        label_selector,
        namespace
    );
    Ok(pod_list.items)
}

/// Same listing, routed through the Karmada cluster proxy of a member cluster.
pub async fn fetch_member_pods_by_label(
    karmada: &Client,
    cluster: &str,
    namespace: &str,
    label_selector: &str,
) -> Result<Vec<Pod>> {
    let url = format!(
        "{}/api/v1/namespaces/{}/pods?labelSelector={}",
        cluster_proxy_path(cluster),
        urlencoding::encode(namespace),
        urlencoding::encode(label_selector)
    );
    let body = get_text(karmada, &url).await?;
    let list: PodList = serde_json::from_str(&body)?;

    debug!(
        "Found {} pod(s) with label '{}' in cluster '{}'",
        list.items.len(),
        label_selector,
        cluster
    );
    Ok(list.items)
}

/// Scrape `/metrics` of a host-cluster pod through the apiserver pod proxy.
pub async fn fetch_pod_metrics(
    client: &Client,
    namespace: &str,
    scheme: &str,
    pod_name: &str,
    port: u16,
) -> Result<Vec<u8>> {
    let url = format!(
        "/api/v1/namespaces/{}/pods/{}:{}:{}/proxy/metrics",
        urlencoding::encode(namespace),
        scheme,
        urlencoding::encode(pod_name),
        port
    );
    Ok(get_text(client, &url).await?.into_bytes())
}

/// Scrape `/metrics` of a member-cluster pod through the cluster proxy.
pub async fn fetch_member_pod_metrics(
    karmada: &Client,
    cluster: &str,
    namespace: &str,
    pod_name: &str,
    port: u16,
) -> Result<Vec<u8>> {
    let url = format!(
        "{}/api/v1/namespaces/{}/pods/{}:{}/proxy/metrics",
        cluster_proxy_path(cluster),
        urlencoding::encode(namespace),
        urlencoding::encode(pod_name),
        port
    );
    Ok(get_text(karmada, &url).await?.into_bytes())
}

pub fn pod_names(pods: Vec<Pod>) -> Vec<String> {
    pods.into_iter().filter_map(|p| p.metadata.name).collect()
}

async fn get_text(client: &Client, url: &str) -> Result<String> {
    let req = HttpRequest::builder()
        .method(Method::GET)
        .uri(url)
        .body(vec![])
        .map_err(|e| anyhow!("Failed to build request: {}", e))?;

    Ok(client.request_text(req).await?)
}
