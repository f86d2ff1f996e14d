//! Sync error types.

use sourcedeck_modules::ModuleError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("cloud store error: {0}")]
    Cloud(String),

    #[error("cloud store unavailable")]
    CloudUnavailable,

    #[error("preference store error: {0}")]
    Preferences(String),

    #[error("catalog error: {0}")]
    Catalog(#[from] ModuleError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
