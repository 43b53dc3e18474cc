//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `dashboard.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - SourcesConfig: where latest.txt and data.txt are read from.
//!     - PollingConfig: fast (snapshot) and slow (alert sweep) intervals.
//!     - StorageConfig: data directory, log bucket key, retained entries.
//!     - MapConfig: fallback coordinate for devices without a fix.
//!     - AlertsConfig: whether the alerting set survives restarts.
//!     - ServerConfig: dashboard bind address.
//!     - LoggingConfig: default tracing filter and per-reading output.
//!
//! every section has defaults, so a file only needs the keys it changes.
//!
//! ==============================================================================

use crate::domain::Coordinates;
use crate::log_store::{DEFAULT_LOG_KEY, MAX_ENTRIES};
use crate::registry::DEFAULT_FALLBACK;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DashboardConfig {
    pub sources: SourcesConfig,
    pub polling: PollingConfig,
    pub storage: StorageConfig,
    pub map: MapConfig,
    pub alerts: AlertsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SourcesConfig {
    /// single latest reading; http(s) url or file path
    pub latest: String,
    /// newline-delimited batch of readings; http(s) url or file path
    pub bulk: String,
    /// per-request timeout for http sources
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConfig {
    pub fast_interval_ms: u64,
    pub slow_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub log_key: String,
    pub max_entries: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    pub fallback_latitude: f64,
    pub fallback_longitude: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AlertsConfig {
    pub persist_state: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            latest: "latest.txt".to_string(),
            bulk: "data.txt".to_string(),
            timeout_ms: 3000,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { fast_interval_ms: 1000, slow_interval_ms: 5000 }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            log_key: DEFAULT_LOG_KEY.to_string(),
            max_entries: MAX_ENTRIES,
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            fallback_latitude: DEFAULT_FALLBACK.latitude,
            fallback_longitude: DEFAULT_FALLBACK.longitude,
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self { persist_state: true }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:3000".to_string() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

impl MapConfig {
    pub fn fallback(&self) -> Coordinates {
        Coordinates::new(self.fallback_latitude, self.fallback_longitude)
    }
}

impl PollingConfig {
    /// Zero intervals would spin, so both are floored at 10ms.
    pub fn fast_interval(&self) -> Duration {
        Duration::from_millis(self.fast_interval_ms.max(10))
    }

    pub fn slow_interval(&self) -> Duration {
        Duration::from_millis(self.slow_interval_ms.max(10))
    }
}

impl DashboardConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }

    /// Load with default fallback
    ///
    /// An explicit path is tried first, then `config/dashboard.toml` and
    /// `../config/dashboard.toml`.
    pub fn load_or_default(explicit: Option<&Path>) -> Self {
        let mut paths: Vec<PathBuf> = explicit.map(Path::to_path_buf).into_iter().collect();
        paths.push(PathBuf::from("config").join("dashboard.toml"));
        paths.push(PathBuf::from("..").join("config").join("dashboard.toml"));

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        println!("[CONFIG] Warning: No config file found - using defaults");
        Self::default()
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│         DASHBOARD CONFIGURATION         │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Latest: {}", self.sources.latest);
        println!("│ Bulk: {}", self.sources.bulk);
        println!(
            "│ Poll: {}ms fast / {}ms slow",
            self.polling.fast_interval_ms, self.polling.slow_interval_ms
        );
        println!("│ Log: {} ({})", self.storage.data_dir.display(), self.storage.log_key);
        println!("│ Persist Alert State: {}", self.alerts.persist_state);
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}
