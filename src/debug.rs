use tracing::info;

use crate::app_state::AppState;

/// Runs only when in KDASH_DEBUG_MODE: prints what would be scraped, then returns.
pub async fn run_debug(state: &AppState) {
    info!("🔧 Debug mode: dumping catalog and sync state...");

    for app in state.catalog.apps() {
        info!(
            app = %app.name,
            namespace = %app.namespace,
            port = app.port,
            scheme = app.scheme,
            kind = ?app.kind,
            "Monitored application"
        );
    }

    for (app, on) in state.sync_supervisor.status().await {
        info!(%app, on, "Sync state");
    }

    info!("Debug tasks completed. Exiting...");
}
