//! Daemon configuration types and loading.
//!
//! Settings resolve in three layers: built-in defaults, then an optional
//! TOML file (an explicit `--config` path, or `~/.config/pharmad/pharmad.toml`
//! when present), then `PHARMAD_*` environment variables. Later layers win.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Listener endpoints.
    pub server: ServerConfig,

    /// Database location.
    pub store: StoreConfig,

    /// Background job cadence and worker pool sizing.
    pub scheduler: SchedulerConfig,
}

/// Listener endpoints for the two channels.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP address the client channel listens on.
    pub listen: String,

    /// Unix socket path for the administrative channel.
    pub admin_socket: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:9999".to_string(),
            admin_socket: PathBuf::from("/tmp/pharma_monitor.sock"),
        }
    }
}

/// Database location and creation defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file. The parent directory is created at startup.
    pub db_path: PathBuf,

    /// Alert threshold (days) assigned to newly created pharmacies.
    pub default_umbral_dias: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_state_dir().join("pharmad.db"),
            default_umbral_dias: pharma_core::DEFAULT_UMBRAL_DIAS,
        }
    }
}

/// Background job cadence and worker pool sizing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between expiration scans.
    pub scan_interval_secs: u64,

    /// Local hour (0-23) at which the daily notification purge runs.
    pub purge_hour: u32,

    /// Read notifications older than this many days are purged.
    pub retention_days: u32,

    /// Number of job worker tasks.
    pub workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 60,
            purge_hour: 3,
            retention_days: 30,
            workers: 4,
        }
    }
}

/// State directory for the database, PID file and logs.
pub fn default_state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("pharmad")
}

impl DaemonConfig {
    /// Loads configuration with the fallback chain, then applies
    /// environment overrides.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            // An explicit path must load; a broken file is a startup error.
            Some(path) => Self::load_from_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => Self::load_user_config(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings no amount of runtime handling can make sense of.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.purge_hour > 23 {
            anyhow::bail!(
                "scheduler.purge_hour must be 0-23, got {}",
                self.scheduler.purge_hour
            );
        }
        if self.scheduler.scan_interval_secs == 0 {
            anyhow::bail!("scheduler.scan_interval_secs must be at least 1");
        }
        if self.scheduler.workers == 0 {
            anyhow::bail!("scheduler.workers must be at least 1");
        }
        if self.store.default_umbral_dias == 0 {
            anyhow::bail!("store.default_umbral_dias must be at least 1");
        }
        Ok(())
    }

    fn load_user_config() -> Self {
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("pharmad").join("pharmad.toml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return config,
                    Err(e) => {
                        warn!(path = %user_config.display(), error = %e, "ignoring unreadable config file");
                    }
                }
            }
        }
        Self::default()
    }

    fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(&path).context("failed to read config file")?;
        let config = toml::from_str(&content).context("failed to parse config file")?;
        Ok(config)
    }

    /// Applies `PHARMAD_*` overrides from `lookup`. Unparseable numeric
    /// values are warned about and skipped, keeping the previous layer.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(listen) = lookup("PHARMAD_LISTEN") {
            self.server.listen = listen;
        }
        if let Some(socket) = lookup("PHARMAD_ADMIN_SOCKET") {
            self.server.admin_socket = PathBuf::from(socket);
        }
        if let Some(db) = lookup("PHARMAD_DB") {
            self.store.db_path = PathBuf::from(db);
        }
        if let Some(v) = lookup("PHARMAD_UMBRAL_DIAS").and_then(|v| parse_env("PHARMAD_UMBRAL_DIAS", &v)) {
            self.store.default_umbral_dias = v;
        }
        if let Some(v) = lookup("PHARMAD_SCAN_INTERVAL").and_then(|v| parse_env("PHARMAD_SCAN_INTERVAL", &v)) {
            self.scheduler.scan_interval_secs = v;
        }
        if let Some(v) = lookup("PHARMAD_PURGE_HOUR").and_then(|v| parse_env("PHARMAD_PURGE_HOUR", &v)) {
            self.scheduler.purge_hour = v;
        }
        if let Some(v) = lookup("PHARMAD_RETENTION_DAYS").and_then(|v| parse_env("PHARMAD_RETENTION_DAYS", &v)) {
            self.scheduler.retention_days = v;
        }
        if let Some(v) = lookup("PHARMAD_WORKERS").and_then(|v| parse_env("PHARMAD_WORKERS", &v)) {
            self.scheduler.workers = v;
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value, "ignoring unparseable environment override");
            None
        }
    }
}
