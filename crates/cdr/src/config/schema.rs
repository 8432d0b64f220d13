use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Deployment configuration (`config-v1.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub version: String,
    #[serde(default = "default_tier")]
    pub tier: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tiers: BTreeMap<String, TierConfig>,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub publishing: PublishingConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

fn default_tier() -> String {
    "DEV".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            tier: default_tier(),
            database: DatabaseConfig::default(),
            tiers: BTreeMap::new(),
            timeouts: TimeoutsConfig::default(),
            jobs: JobsConfig::default(),
            publishing: PublishingConfig::default(),
            audio: AudioConfig::default(),
            engine: EngineConfig::default(),
            credentials: CredentialsConfig::default(),
        }
    }
}

impl Config {
    /// Host names for the active tier.
    pub fn hosts(&self) -> Result<&TierHosts, ConfigError> {
        self.tiers
            .get(&self.tier)
            .map(|t| &t.hosts)
            .ok_or_else(|| ConfigError::UnknownTier(self.tier.clone()))
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        match self.database.path {
            Some(ref p) => Some(PathBuf::from(p)),
            None => crate::db::default_database_path(),
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            database: Duration::from_millis(self.timeouts.database_ms),
            filter: Duration::from_millis(self.timeouts.filter_ms),
            http: Duration::from_millis(self.timeouts.http_ms),
            sftp: Duration::from_millis(self.timeouts.sftp_ms),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierConfig {
    #[serde(default)]
    pub hosts: TierHosts,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierHosts {
    #[serde(default)]
    pub sftp: Option<String>,
    #[serde(default)]
    pub bibliographic: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutsConfig {
    /// How long to wait for a database lock held by another process.
    #[serde(default = "default_database_ms")]
    pub database_ms: u64,
    #[serde(default = "default_filter_ms")]
    pub filter_ms: u64,
    #[serde(default = "default_http_ms")]
    pub http_ms: u64,
    #[serde(default = "default_sftp_ms")]
    pub sftp_ms: u64,
}

fn default_database_ms() -> u64 {
    5_000
}

fn default_filter_ms() -> u64 {
    60_000
}

fn default_http_ms() -> u64 {
    15_000
}

fn default_sftp_ms() -> u64 {
    120_000
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            database_ms: default_database_ms(),
            filter_ms: default_filter_ms(),
            http_ms: default_http_ms(),
            sftp_ms: default_sftp_ms(),
        }
    }
}

/// Per-call-site time limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub database: Duration,
    pub filter: Duration,
    pub http: Duration,
    pub sftp: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Config::default().timeouts()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Base URL of the batch status page; the job id is appended.
    #[serde(default)]
    pub status_url: Option<String>,
}

fn default_worker_count() -> usize {
    num_cpus::get().clamp(1, 4)
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_stale_after_secs() -> u64 {
    600
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    2_000
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            poll_interval_ms: default_poll_interval_ms(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            status_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishingConfig {
    /// Parent of per-job output directories.
    #[serde(default)]
    pub output_root: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConfig {
    /// Local mirror of the audio delivery drop.
    #[serde(default)]
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_engine_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_engine_command() -> String {
    "xsltproc".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: default_engine_command(),
            args: Vec::new(),
        }
    }
}

/// Where to find a secret; resolved at the point of use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretSource {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub env_var: Option<String>,
}

impl SecretSource {
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.file.is_none() && self.env_var.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsConfig {
    #[serde(default)]
    pub bibliographic_api_key: SecretSource,
}
