//! Module catalog error types.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("module already added: {0}")]
    DuplicateModule(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid module descriptor: {0}")]
    Decode(String),

    #[error("module script is not valid UTF-8 text: {0}")]
    Encoding(String),

    #[error("module not found: {0}")]
    NotFound(Uuid),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModuleError {
    /// Whether the failure means the module is already in the catalog.
    ///
    /// Callers use this to stop offering the add action instead of
    /// suggesting a retry.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, ModuleError::DuplicateModule(_))
    }
}
