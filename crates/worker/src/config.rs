use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use stmtflow_import::{DuplicatePolicy, ParserProfile};
use stmtflow_queue::{MaintenanceOptions, SendOptions, WorkOptions};
use thiserror::Error;

pub const CONFIG_ENV: &str = "STMTFLOW_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "stmtflow.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Unknown MODE '{0}', expected server, worker or both")]
    InvalidMode(String),
}

/// Which halves of the process to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Server,
    Worker,
    #[default]
    Both,
}

impl std::str::FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(RunMode::Server),
            "worker" => Ok(RunMode::Worker),
            "both" => Ok(RunMode::Both),
            other => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }
}

impl RunMode {
    pub fn runs_worker(&self) -> bool {
        matches!(self, RunMode::Worker | RunMode::Both)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mode: RunMode,
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub jobs: JobsConfig,
    pub storage: StorageConfig,
    pub dedup: DedupConfig,
    pub log: LogConfig,
    pub parsers: Vec<ParserProfile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub queue_schema: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/stmtflow".to_string(),
            max_connections: 5,
            queue_schema: "stmtflow_queue".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub poll_interval_ms: u64,
    pub max_poll_interval_ms: u64,
    pub monitor_interval_secs: u64,
    pub maintenance_interval_secs: u64,
    pub archive_completed_after_secs: u64,
    pub delete_after_days: u64,
    /// Periodic stats logging in worker-only mode.
    pub stats_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_poll_interval_ms: 10_000,
            monitor_interval_secs: 10,
            maintenance_interval_secs: 120,
            archive_completed_after_secs: 60 * 60 * 24,
            delete_after_days: 7,
            stats_interval_secs: 30,
        }
    }
}

impl QueueConfig {
    pub fn maintenance_options(&self, log_stats: bool) -> MaintenanceOptions {
        MaintenanceOptions {
            monitor_interval: Duration::from_secs(self.monitor_interval_secs.max(1)),
            maintenance_interval: Duration::from_secs(self.maintenance_interval_secs.max(1)),
            archive_completed_after: Duration::from_secs(self.archive_completed_after_secs),
            delete_after: Duration::from_secs(self.delete_after_days * 24 * 60 * 60),
            stats_interval: (log_stats && self.stats_interval_secs > 0)
                .then(|| Duration::from_secs(self.stats_interval_secs)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub detect_parser: JobConfig,
    pub parse_file: JobConfig,
}

/// Delivery and execution settings for one job name.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub concurrency: usize,
    pub retry_limit: i32,
    pub retry_delay_secs: i32,
    pub retry_backoff: bool,
    pub expire_in_minutes: i32,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            retry_limit: 2,
            retry_delay_secs: 30,
            retry_backoff: true,
            expire_in_minutes: 15,
        }
    }
}

impl JobConfig {
    pub fn send_options(&self) -> SendOptions {
        SendOptions {
            retry_limit: self.retry_limit,
            retry_delay_secs: self.retry_delay_secs,
            retry_backoff: self.retry_backoff,
            ..SendOptions::default()
        }
        .expire_in_minutes(self.expire_in_minutes)
    }

    pub fn work_options(&self, queue: &QueueConfig) -> WorkOptions {
        WorkOptions {
            concurrency: self.concurrency.max(1),
            poll_interval: Duration::from_millis(queue.poll_interval_ms),
            max_poll_interval: Duration::from_millis(
                queue.max_poll_interval_ms.max(queue.poll_interval_ms),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Local,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub kind: StorageKind,
    /// Directory holding uploaded files for `local`.
    pub root: PathBuf,
    /// Bucket or CDN origin that storage keys are appended to for `http`.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::Local,
            root: PathBuf::from("./uploads"),
            base_url: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupMode {
    #[default]
    Exact,
    Fuzzy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub policy: DedupMode,
    pub fuzzy_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            policy: DedupMode::Exact,
            fuzzy_threshold: DuplicatePolicy::DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

impl DedupConfig {
    pub fn policy(&self) -> DuplicatePolicy {
        match self.policy {
            DedupMode::Exact => DuplicatePolicy::Exact,
            DedupMode::Fuzzy => DuplicatePolicy::Fuzzy {
                threshold: self.fuzzy_threshold,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read `path` if it exists; a missing file means defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Load from `STMTFLOW_CONFIG` (or `stmtflow.toml`) and apply
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(Path::new(&path))?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(url) = var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(mode) = var("MODE") {
            self.mode = mode.parse()?;
        }
        if let Some(filter) = var("RUST_LOG") {
            self.log.filter = filter;
        }
        Ok(())
    }
}
