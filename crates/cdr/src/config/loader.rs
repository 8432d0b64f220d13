use std::path::{Path, PathBuf};

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

/// Environment variable that overrides the configured tier.
pub const TIER_ENV_VAR: &str = "CDR_TIER";

/// Returns the default config location: `~/.cdr/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".cdr").join("config.json"))
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let mut config: Config = serde_json::from_value(json_value)?;

    apply_env_overrides(&mut config);

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(tier) = std::env::var(TIER_ENV_VAR) {
        let tier = tier.trim().to_ascii_uppercase();
        if !tier.is_empty() {
            log::info!("Tier overridden by {}: {}", TIER_ENV_VAR, tier);
            config.tier = tier;
        }
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if !config.tiers.is_empty() && !config.tiers.contains_key(&config.tier) {
        return Err(ConfigError::UnknownTier(config.tier.clone()));
    }

    if config.jobs.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "jobs.workerCount must be at least 1".to_string(),
        });
    }

    if config.jobs.stale_after_secs <= config.jobs.heartbeat_interval_secs {
        return Err(ConfigError::Validation {
            message: format!(
                "jobs.staleAfterSecs ({}) must exceed jobs.heartbeatIntervalSecs ({})",
                config.jobs.stale_after_secs, config.jobs.heartbeat_interval_secs
            ),
        });
    }

    if config.engine.command.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "engine.command must not be empty".to_string(),
        });
    }

    Ok(())
}
