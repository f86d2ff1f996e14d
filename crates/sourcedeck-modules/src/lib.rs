//! SourceDeck module catalog.
//!
//! Modules are remotely published content-source plugins: a JSON
//! descriptor plus a script. This crate fetches and validates them, keeps
//! the local catalog file and script files consistent, and reports
//! changes through a per-manager event channel.

pub mod catalog;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod manager;

pub use catalog::{CatalogStore, CatalogTxn, ModuleRecord, StagedScript, CATALOG_FILE_NAME};
pub use config::ModulesConfig;
pub use descriptor::{Author, ModuleDescriptor};
pub use error::ModuleError;
pub use events::ModuleEvent;
pub use fetcher::{HttpFetcher, ModuleFetcher};
pub use manager::{ModuleFailure, ModuleManager, RefreshReport, RestoreReport};
