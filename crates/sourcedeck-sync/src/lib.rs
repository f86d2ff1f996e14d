//! Cloud reconciliation for SourceDeck.
//!
//! Keeps the module catalog file and the synced subset of local
//! preferences consistent with a cloud store shared by all of a user's
//! devices. Last writer wins per file and per key.

pub mod cloud;
pub mod config;
pub mod error;
pub mod events;
pub mod keys;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod preferences;
pub mod reconciler;
pub mod worker;

pub use cloud::{CloudStore, DirectoryCloudStore};
pub use config::SyncConfig;
pub use error::SyncError;
pub use events::{
    ChangeOrigin, CloudChange, CloudChangeReason, PreferenceChange, SyncEvent, SyncTrigger,
};
pub use preferences::{JsonPreferenceStore, PreferenceStore, PREFERENCES_FILE_NAME};
pub use reconciler::{CatalogOutcome, CloudReconciler, SyncDirection, SyncReport};
pub use worker::spawn_sync_worker;
