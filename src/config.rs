use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

const ENV_PREFIX: &str = "KDASH_";

/// Process configuration, read from `KDASH_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub server_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub karmada_kubeconfig: Option<PathBuf>,
    pub namespace: String,
    pub retention_window: u32,
    pub write_queue_capacity: usize,
    pub sync_interval: Duration,
    pub sync_restore_state: bool,
    pub debug_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            data_dir: PathBuf::from("data/metrics"),
            log_dir: PathBuf::from("data/logs"),
            karmada_kubeconfig: None,
            namespace: "karmada-system".to_string(),
            retention_window: 900,
            write_queue_capacity: 256,
            sync_interval: Duration::from_millis(1000),
            sync_restore_state: true,
            debug_mode: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let config = Self {
            server_addr: parse_or(get("SERVER_ADDR"), "SERVER_ADDR", defaults.server_addr)?,
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            log_dir: get("LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir),
            karmada_kubeconfig: get("KARMADA_KUBECONFIG").map(PathBuf::from),
            namespace: get("NAMESPACE").unwrap_or(defaults.namespace),
            retention_window: parse_or(
                get("RETENTION_WINDOW"),
                "RETENTION_WINDOW",
                defaults.retention_window,
            )?,
            write_queue_capacity: parse_or(
                get("WRITE_QUEUE_CAPACITY"),
                "WRITE_QUEUE_CAPACITY",
                defaults.write_queue_capacity,
            )?,
            sync_interval: Duration::from_millis(parse_or(
                get("SYNC_INTERVAL_MS"),
                "SYNC_INTERVAL_MS",
                defaults.sync_interval.as_millis() as u64,
            )?),
            sync_restore_state: parse_bool_or(
                get("SYNC_RESTORE_STATE"),
                "SYNC_RESTORE_STATE",
                defaults.sync_restore_state,
            )?,
            debug_mode: parse_bool_or(get("DEBUG_MODE"), "DEBUG_MODE", defaults.debug_mode)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.retention_window == 0 {
            bail!("{ENV_PREFIX}RETENTION_WINDOW must be at least 1");
        }
        if self.write_queue_capacity == 0 {
            bail!("{ENV_PREFIX}WRITE_QUEUE_CAPACITY must be at least 1");
        }
        if self.sync_interval.is_zero() {
            bail!("{ENV_PREFIX}SYNC_INTERVAL_MS must be at least 1");
        }
        Ok(())
    }
}

fn parse_or<T>(raw: Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("invalid {ENV_PREFIX}{name}: '{raw}'")),
        None => Ok(default),
    }
}

fn parse_bool_or(raw: Option<String>, name: &str, default: bool) -> Result<bool> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => bail!("invalid {ENV_PREFIX}{name}: '{other}'"),
    }
}
