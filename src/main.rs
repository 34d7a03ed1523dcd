mod api;
mod app_state;
mod config;
mod core;
mod debug;
mod domain;
mod errors;
mod routes;
mod scheduler;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::app_state::AppState;
use crate::config::AppConfig;
use crate::core::client::clusters::fetch_member_clusters;
use crate::core::client::kube_client::{build_karmada_client, build_kube_client};
use crate::core::persistence::metrics::metric_store_registry::MetricStoreRegistry;
use crate::core::persistence::metrics::metric_write_queue::MetricWriter;
use crate::core::persistence::sync::app_sync_repository::AppSyncSqliteRepository;
use crate::core::state::runtime::sync::sync_supervisor::SyncSupervisor;
use crate::domain::common::model::monitored_app::AppCatalog;
use crate::domain::metric::service::metric_fetch_service::MetricFetchService;
use crate::domain::metric::service::metric_query_service::MetricQueryService;
use crate::scheduler::tasks::collectors::karmada::source::KubeMetricsSource;
use crate::scheduler::tasks::collectors::karmada::task::MetricsCollector;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    let _log_guard = init_tracing(&config)?;

    info!(
        addr = %config.server_addr,
        data_dir = %config.data_dir.display(),
        "Starting metrics core"
    );

    // --- Clusters ---
    let host = build_kube_client().await?;
    let karmada = build_karmada_client(config.karmada_kubeconfig.as_deref(), &host).await?;

    let members: Vec<String> = match fetch_member_clusters(&karmada).await {
        Ok(clusters) => clusters.into_iter().map(|c| c.name).collect(),
        Err(e) => {
            warn!(error = %e, "Could not list member clusters; estimators are not monitored");
            Vec::new()
        }
    };
    let catalog = Arc::new(AppCatalog::build(&config.namespace, &members));
    info!(apps = catalog.apps().len(), members = members.len(), "Application catalog built");

    // --- Storage ---
    let registry = Arc::new(
        MetricStoreRegistry::open(&config.data_dir)
            .await
            .context("failed to initialize metric storage")?,
    );
    let (queue, writer_handle) = MetricWriter::spawn(
        registry.clone(),
        config.retention_window,
        config.write_queue_capacity,
    );
    let sync_repository = Arc::new(
        AppSyncSqliteRepository::new(registry.control_pool().clone())
            .await
            .context("failed to initialize sync state table")?,
    );

    // --- Services ---
    let source = Arc::new(KubeMetricsSource::new(host, karmada));
    let collector = MetricsCollector::new(source, queue);
    let supervisor = Arc::new(SyncSupervisor::new(
        catalog.clone(),
        collector.clone(),
        sync_repository,
        config.sync_interval,
    ));

    let state = AppState {
        catalog: catalog.clone(),
        sync_supervisor: supervisor.clone(),
        metric_fetch_service: Arc::new(MetricFetchService::new(catalog, collector)),
        metric_query_service: Arc::new(MetricQueryService::new(registry.clone())),
    };

    if config.debug_mode {
        debug::run_debug(&state).await;
        registry.close().await;
        return Ok(());
    }

    supervisor.start_all(config.sync_restore_state).await;

    // --- HTTP ---
    let app = routes::app_router().with_state(state);
    let listener = tokio::net::TcpListener::bind(config.server_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server_addr))?;
    info!(addr = %config.server_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // --- Shutdown ---
    supervisor.shutdown().await;
    // Dropping every queue handle lets the writer drain and exit.
    drop(supervisor);
    if tokio::time::timeout(std::time::Duration::from_secs(10), writer_handle)
        .await
        .is_err()
    {
        warn!("Metric writer did not stop in time; pending writes are lost");
    }
    registry.close().await;
    info!("Metrics core stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("failed to create log dir {}", config.log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "kdash.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c; shutting down");
    }
    info!("Shutdown signal received");
}
