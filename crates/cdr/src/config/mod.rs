pub mod loader;
pub mod schema;

pub use loader::{default_config_path, load_config, load_config_from_str, TIER_ENV_VAR};
pub use schema::{
    AudioConfig, Config, CredentialsConfig, DatabaseConfig, EngineConfig, JobsConfig,
    PublishingConfig, SecretSource, TierConfig, TierHosts, Timeouts, TimeoutsConfig,
};
