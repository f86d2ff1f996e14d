//! Module manager configuration.

use std::env;

/// Default per-request timeout for descriptor and script fetches.
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;

/// Default number of descriptor fetches `refresh_all` runs at once.
const DEFAULT_MAX_CONCURRENT_REFRESHES: usize = 8;

#[derive(Debug, Clone)]
pub struct ModulesConfig {
    /// Timeout applied by the HTTP fetcher to each request.
    pub fetch_timeout_secs: u64,
    /// Upper bound on concurrent descriptor fetches during a refresh.
    pub max_concurrent_refreshes: usize,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            max_concurrent_refreshes: DEFAULT_MAX_CONCURRENT_REFRESHES,
        }
    }
}

impl ModulesConfig {
    pub fn from_env() -> Self {
        Self {
            fetch_timeout_secs: env::var("MODULE_FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
            max_concurrent_refreshes: env::var("MODULE_MAX_CONCURRENT_REFRESHES")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(DEFAULT_MAX_CONCURRENT_REFRESHES),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ModulesConfig::default();
        assert_eq!(config.fetch_timeout_secs, 15);
        assert_eq!(config.max_concurrent_refreshes, 8);
    }
}
