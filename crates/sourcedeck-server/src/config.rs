//! Server configuration, read from the environment.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use sourcedeck_modules::ModulesConfig;
use sourcedeck_sync::SyncConfig;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_DATA_DIR: &str = "./data";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Root of the local store: catalog file, scripts, preferences.
    pub data_dir: PathBuf,
    /// Run a module refresh right after the launch pull.
    pub refresh_on_launch: bool,
    /// Allowed CORS origins. Empty means same-origin only.
    pub cors_origins: Vec<String>,
    pub modules: ModulesConfig,
    pub sync: SyncConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            refresh_on_launch: false,
            cors_origins: Vec::new(),
            modules: ModulesConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind = env::var("SOURCEDECK_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
        let bind = bind.parse().unwrap_or_else(|e| {
            tracing::warn!(%bind, "invalid SOURCEDECK_BIND ({e}), using {DEFAULT_BIND}");
            defaults.bind
        });

        Self {
            bind,
            data_dir: env::var("SOURCEDECK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            refresh_on_launch: env::var("MODULE_REFRESH_ON_LAUNCH")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(defaults.refresh_on_launch),
            cors_origins: env::var("CORS_ORIGINS")
                .map(|v| parse_origins(&v))
                .unwrap_or_default(),
            modules: ModulesConfig::from_env(),
            sync: SyncConfig::from_env(),
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
