/// Kubernetes and Karmada resource types used by the collectors.

pub use k8s_openapi::api::core::v1::Pod;

pub use kube::core::{ApiResource, DynamicObject, GroupVersionKind};

pub const CLUSTER_GROUP: &str = "cluster.karmada.io";
pub const CLUSTER_VERSION: &str = "v1alpha1";
pub const CLUSTER_KIND: &str = "Cluster";

/// `clusters.cluster.karmada.io`, cluster-scoped.
pub fn cluster_resource() -> ApiResource {
    let gvk = GroupVersionKind::gvk(CLUSTER_GROUP, CLUSTER_VERSION, CLUSTER_KIND);
    ApiResource::from_gvk_with_plural(&gvk, "clusters")
}

/// Base path of the Karmada aggregated cluster proxy.
pub fn cluster_proxy_path(cluster: &str) -> String {
    format!(
        "/apis/{CLUSTER_GROUP}/{CLUSTER_VERSION}/clusters/{}/proxy",
        urlencoding::encode(cluster)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_path_targets_cluster_subresource() {
        assert_eq!(
            cluster_proxy_path("member1"),
            "/apis/cluster.karmada.io/v1alpha1/clusters/member1/proxy"
        );
        assert_eq!(cluster_resource().plural, "clusters");
    }
}
