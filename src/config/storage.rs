//! Storage configuration types.

use serde::Deserialize;

/// Storage type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Memory,
    #[default]
    Sqlite,
}

/// Storage configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// SQLite-specific configuration.
    pub sqlite: SqliteConfig,
    /// Snapshot flags for debugging and troubleshooting.
    pub snapshots: SnapshotsConfig,
}

/// SQLite-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file path.
    pub path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "./data/palisade.db".to_string(),
        }
    }
}

/// Snapshot configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotsConfig {
    /// Enable reading snapshots when loading write models.
    /// When false, always replays all events from the beginning.
    /// Default: true
    pub read: bool,
    /// Enable writing snapshots after loading write models.
    /// Default: true
    pub write: bool,
    /// Number of replayed events after which a new snapshot is written.
    /// Default: 100
    pub interval: u64,
}

impl Default for SnapshotsConfig {
    fn default() -> Self {
        Self {
            read: true,
            write: true,
            interval: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_default() {
        let storage = StorageConfig::default();
        assert_eq!(storage.storage_type, StorageType::Sqlite);
        assert_eq!(storage.sqlite.path, "./data/palisade.db");
        assert!(storage.snapshots.read);
        assert!(storage.snapshots.write);
        assert_eq!(storage.snapshots.interval, 100);
    }

    #[test]
    fn test_storage_type_parses_lowercase() {
        let config: StorageConfig = serde_yaml::from_str("type: memory").unwrap();
        assert_eq!(config.storage_type, StorageType::Memory);
    }
}
