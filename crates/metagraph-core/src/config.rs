//! Configuration for the synchronization layer.
//!
//! The layer receives a [`SyncConfig`] through its constructors and never
//! reads the environment itself. Embedding services can use
//! [`load_sync_config`], which reads (in priority order):
//! 1. Environment variables (`METAGRAPH__SYNC__` prefix)
//! 2. Config file (`<prefix>.toml`, `[sync]` section)
//! 3. Defaults

use serde::Deserialize;

/// Tunables for the facade and synchronizers.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SyncConfig {
    /// Name reported in errors and logs.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Page size used when a caller passes zero.
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Largest page a caller may request.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// Number of edges read before a last-use delete.
    #[serde(default = "default_last_use_page_size")]
    pub last_use_page_size: usize,

    /// Deepest nesting of embedded composites accepted by save.
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,

    /// What save does with a child it no longer links to.
    #[serde(default)]
    pub orphan_policy: OrphanPolicy,
}

/// Handling of children displaced by an update.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Detach the edge, keep the child node.
    #[default]
    Retain,
    /// Detach the edge, then remove the child unless something else still uses it.
    RemoveIfUnused,
}

fn default_service_name() -> String {
    "metagraph".to_string()
}

fn default_page_size() -> usize {
    100
}

fn default_max_page_size() -> usize {
    1000
}

fn default_last_use_page_size() -> usize {
    5
}

fn default_max_nesting_depth() -> usize {
    16
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            last_use_page_size: default_last_use_page_size(),
            max_nesting_depth: default_max_nesting_depth(),
            orphan_policy: OrphanPolicy::default(),
        }
    }
}

impl SyncConfig {
    pub fn with_orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.orphan_policy = policy;
        self
    }
}

/// Load the `[sync]` section from `<file_prefix>.toml` and the environment.
///
/// A missing file or section yields the defaults; a malformed one is an error.
pub fn load_sync_config(file_prefix: &str) -> anyhow::Result<SyncConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("METAGRAPH")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<SyncConfig>("sync") {
        Ok(c) => Ok(c),
        Err(config::ConfigError::NotFound(_)) => {
            tracing::debug!(file_prefix, "No [sync] configuration found, using defaults");
            Ok(SyncConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.service_name, "metagraph");
        assert_eq!(config.default_page_size, 100);
        assert_eq!(config.max_page_size, 1000);
        assert_eq!(config.last_use_page_size, 5);
        assert_eq!(config.orphan_policy, OrphanPolicy::Retain);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metagraph.toml");
        std::fs::write(
            &path,
            "[sync]\nservice_name = \"catalog\"\nlast_use_page_size = 2\norphan_policy = \"remove_if_unused\"\n",
        )
        .unwrap();

        let prefix = dir.path().join("metagraph");
        let config = load_sync_config(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config.service_name, "catalog");
        assert_eq!(config.last_use_page_size, 2);
        assert_eq!(config.default_page_size, 100);
        assert_eq!(config.orphan_policy, OrphanPolicy::RemoveIfUnused);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("absent");
        let config = load_sync_config(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config, SyncConfig::default());
    }
}
