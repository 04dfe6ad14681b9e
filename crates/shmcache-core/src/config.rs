//! Store configuration

use crate::address::DEFAULT_SEGMENT_PREFIX;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Settings shared by the cache store and the buffer codec
///
/// ```toml
/// cache_dir = "/data/obs.ms.ddfcache"
/// reset = false
/// segment_prefix = "ddf"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Namespace root of the cache store
    pub cache_dir: PathBuf,
    /// Wipe the namespace when the store opens
    pub reset: bool,
    /// Prefix of shared segment names
    pub segment_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("ddfcache"),
            reset: false,
            segment_prefix: DEFAULT_SEGMENT_PREFIX.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = StoreConfig::from_toml_str("").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.segment_prefix, "ddf");
    }

    #[test]
    fn partial_config_overrides() {
        let config = StoreConfig::from_toml_str("cache_dir = \"/tmp/x.ddfcache\"\nreset = true\n").unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/x.ddfcache"));
        assert!(config.reset);
        assert_eq!(config.segment_prefix, "ddf");
    }

    #[test]
    fn unknown_key_is_config_error() {
        assert!(matches!(
            StoreConfig::from_toml_str("cache_root = \"x\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            StoreConfig::load(&dir.path().join("absent.toml")),
            Err(Error::Config(_))
        ));
    }
}
