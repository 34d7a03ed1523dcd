// Kube-rs based clients for the host cluster and the Karmada control plane
pub mod clusters;
pub mod kube_client;
pub mod kube_resources;
pub mod pods;
