use std::path::Path;

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

/// Client for the host cluster the control-plane components run in.
pub async fn build_kube_client() -> Result<Client> {
    let client = Client::try_default()
        .await
        .context("failed to build host cluster client")?;

    debug!("Host cluster client initialized");
    Ok(client)
}

/// Client for the Karmada apiserver.
///
/// Without an explicit kubeconfig the default client is reused, which is the
/// usual setup when the dashboard runs against a karmada-apiserver context.
pub async fn build_karmada_client(kubeconfig: Option<&Path>, host: &Client) -> Result<Client> {
    let Some(path) = kubeconfig else {
        debug!("No Karmada kubeconfig set; sharing the host client");
        return Ok(host.clone());
    };

    let kubeconfig = Kubeconfig::read_from(path)
        .with_context(|| format!("failed to read Karmada kubeconfig {}", path.display()))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .context("invalid Karmada kubeconfig")?;
    let client = Client::try_from(config).context("failed to build Karmada client")?;

    debug!(path = %path.display(), "Karmada client initialized");
    Ok(client)
}
