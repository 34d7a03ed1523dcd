//! Per-application on/off scraping loops.
//!
//! The supervisor holds one entry per catalog application behind a single
//! async mutex. Every transition happens under that lock, so an application
//! never has two live loops.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::sync_state::{SyncError, SyncReport, SyncTransition};
use crate::core::persistence::sync::app_sync_repository::AppSyncRepository;
use crate::domain::common::model::monitored_app::{AppCatalog, MonitoredApp};
use crate::scheduler::tasks::collectors::karmada::fetcher::WriteMode;
use crate::scheduler::tasks::collectors::karmada::task::MetricsCollector;

#[derive(Default)]
struct SyncEntry {
    enabled: bool,
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

pub struct SyncSupervisor {
    catalog: Arc<AppCatalog>,
    collector: MetricsCollector,
    repository: Arc<dyn AppSyncRepository>,
    interval: Duration,
    entries: Mutex<HashMap<String, SyncEntry>>,
}

impl SyncSupervisor {
    pub fn new(
        catalog: Arc<AppCatalog>,
        collector: MetricsCollector,
        repository: Arc<dyn AppSyncRepository>,
        interval: Duration,
    ) -> Self {
        let entries = catalog
            .names()
            .map(|name| (name.to_string(), SyncEntry::default()))
            .collect();
        Self {
            catalog,
            collector,
            repository,
            interval,
            entries: Mutex::new(entries),
        }
    }

    /// Starts the loops at process start.
    ///
    /// With `restore` set, an app stays off when `app_sync` says so; every
    /// other app starts on and is recorded as on. Returns the number of loops
    /// started.
    pub async fn start_all(&self, restore: bool) -> usize {
        let persisted = if restore {
            self.repository.load_all().await.unwrap_or_else(|e| {
                warn!(error = %e, "Could not load persisted sync state; starting every app");
                HashMap::new()
            })
        } else {
            HashMap::new()
        };

        let mut entries = self.entries.lock().await;
        let mut started = 0;
        for app in self.catalog.apps() {
            if !persisted.get(&app.name).copied().unwrap_or(true) {
                debug!(app = %app.name, "Sync left off from persisted state");
                continue;
            }
            let entry = entries.entry(app.name.clone()).or_default();
            self.start_entry(entry, app);
            self.persist(&app.name, true).await;
            started += 1;
        }
        info!(started, total = self.catalog.apps().len(), "Sync loops started");
        started
    }

    pub async fn turn_on(&self, app: &str) -> Result<SyncReport, SyncError> {
        let monitored = self.lookup(app)?;
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(app.to_string()).or_default();
        Ok(self.switch_on(entry, monitored).await)
    }

    pub async fn turn_off(&self, app: &str) -> Result<SyncReport, SyncError> {
        self.lookup(app)?;
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(app.to_string()).or_default();
        Ok(self.switch_off(entry, app).await)
    }

    /// Turns every known app on, reporting each one.
    pub async fn turn_on_all(&self) -> Vec<SyncReport> {
        let mut entries = self.entries.lock().await;
        let mut reports = Vec::with_capacity(self.catalog.apps().len());
        for app in self.catalog.apps() {
            let entry = entries.entry(app.name.clone()).or_default();
            reports.push(self.switch_on(entry, app).await);
        }
        reports
    }

    pub async fn turn_off_all(&self) -> Vec<SyncReport> {
        let mut entries = self.entries.lock().await;
        let mut reports = Vec::with_capacity(self.catalog.apps().len());
        for app in self.catalog.apps() {
            let entry = entries.entry(app.name.clone()).or_default();
            reports.push(self.switch_off(entry, &app.name).await);
        }
        reports
    }

    pub async fn status(&self) -> BTreeMap<String, bool> {
        let entries = self.entries.lock().await;
        self.catalog
            .names()
            .map(|name| {
                let on = entries.get(name).map(|e| e.enabled).unwrap_or(false);
                (name.to_string(), on)
            })
            .collect()
    }

    /// Number of loop tasks that are still running.
    #[cfg(test)]
    pub async fn active_loops(&self) -> usize {
        let entries = self.entries.lock().await;
        entries
            .values()
            .filter(|e| e.handle.as_ref().is_some_and(|h| !h.is_finished()))
            .count()
    }

    /// Cancels every loop and waits for them to exit.
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut entries = self.entries.lock().await;
            entries
                .values_mut()
                .filter_map(|entry| {
                    if let Some(cancel) = entry.cancel.take() {
                        cancel.cancel();
                    }
                    entry.handle.take()
                })
                .collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
        info!("Sync loops stopped");
    }

    fn lookup(&self, app: &str) -> Result<&MonitoredApp, SyncError> {
        self.catalog
            .get(app)
            .ok_or_else(|| SyncError::UnknownApp(app.to_string()))
    }

    async fn switch_on(&self, entry: &mut SyncEntry, app: &MonitoredApp) -> SyncReport {
        if entry.enabled {
            return SyncReport::new(&app.name, SyncTransition::AlreadyOn);
        }
        self.start_entry(entry, app);
        self.persist(&app.name, true).await;
        info!(app = %app.name, "Sync turned on");
        SyncReport::new(&app.name, SyncTransition::Started)
    }

    async fn switch_off(&self, entry: &mut SyncEntry, app: &str) -> SyncReport {
        if !entry.enabled {
            return SyncReport::new(app, SyncTransition::AlreadyOff);
        }
        if let Some(cancel) = entry.cancel.take() {
            cancel.cancel();
        }
        entry.handle = None;
        entry.enabled = false;
        self.persist(app, false).await;
        info!(app, "Sync turned off");
        SyncReport::new(app, SyncTransition::Stopped)
    }

    fn start_entry(&self, entry: &mut SyncEntry, app: &MonitoredApp) {
        // A loop still draining after an earlier cancel is left to finish on its own.
        let cancel = CancellationToken::new();
        entry.handle = Some(self.spawn_loop(app.clone(), cancel.clone()));
        entry.cancel = Some(cancel);
        entry.enabled = true;
    }

    async fn persist(&self, app: &str, enabled: bool) {
        if let Err(e) = self.repository.upsert(app, enabled).await {
            warn!(app, enabled, error = %e, "Failed to persist sync state");
        }
    }

    fn spawn_loop(&self, app: MonitoredApp, cancel: CancellationToken) -> JoinHandle<()> {
        let collector = self.collector.clone();
        let period = self.interval;

        tokio::spawn(async move {
            debug!(app = %app.name, ?period, "Sync loop running");
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if cancel.is_cancelled() {
                    break;
                }

                // Cycles overlap when a scrape outlives the tick.
                let collector = collector.clone();
                let app = app.clone();
                let cycle_cancel = cancel.clone();
                tokio::spawn(async move {
                    match collector.run_cycle(&app, &cycle_cancel, WriteMode::Submit).await {
                        Ok(result) => debug!(
                            app = %app.name,
                            snapshots = result.snapshots.len(),
                            errors = result.errors.len(),
                            "Sync cycle done"
                        ),
                        Err(e) => warn!(app = %app.name, error = %e, "Sync cycle failed"),
                    }
                });
            }
            debug!(app = %app.name, "Sync loop exited");
        })
    }
}
