//! Cloud sync configuration.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Whether cloud reconciliation runs at all.
    pub enabled: bool,
    /// Root of the directory-backed cloud store.
    pub cloud_dir: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cloud_dir: PathBuf::from("./data/cloud"),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env::var("SOURCEDECK_CLOUD_ENABLED")
                .map(|v| !v.eq_ignore_ascii_case("false") && v != "0")
                .unwrap_or(defaults.enabled),
            cloud_dir: env::var("SOURCEDECK_CLOUD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cloud_dir),
        }
    }
}
