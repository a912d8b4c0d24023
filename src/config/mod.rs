//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod consistency;
mod storage;

pub use consistency::{ConsistencyConfig, ProjectionsConfig};
pub use storage::{SnapshotsConfig, SqliteConfig, StorageConfig, StorageType};

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "PALISADE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "PALISADE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "PALISADE_LOG";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ID of the instance; resource owner of instance-level aggregates.
    pub instance_id: String,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Read-after-write coordinator configuration.
    pub consistency: ConsistencyConfig,
    /// Projection worker configuration.
    pub projections: ProjectionsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instance_id: "default".to_string(),
            storage: StorageConfig::default(),
            consistency: ConsistencyConfig::default(),
            projections: ProjectionsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix, `__` separated
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config: Config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Config backed by in-memory storage, for tests and embedded use.
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.storage.storage_type = StorageType::Memory;
        config
    }

    /// Reject settings the core cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instance_id.is_empty() {
            return Err(ConfigError::Invalid("instance_id must not be empty".into()));
        }
        if self.storage.snapshots.interval == 0 {
            return Err(ConfigError::Invalid(
                "storage.snapshots.interval must be positive".into(),
            ));
        }
        if self.consistency.min_delay_ms > self.consistency.max_delay_ms {
            return Err(ConfigError::Invalid(
                "consistency.min_delay_ms exceeds max_delay_ms".into(),
            ));
        }
        if self.consistency.factor < 1.0 {
            return Err(ConfigError::Invalid(
                "consistency.factor must be at least 1".into(),
            ));
        }
        if self.projections.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "projections.batch_size must be positive".into(),
            ));
        }
        Ok(())
    }
}
