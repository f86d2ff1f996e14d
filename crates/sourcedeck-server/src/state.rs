use std::sync::Arc;

use sourcedeck_modules::ModuleManager;
use sourcedeck_sync::{CloudReconciler, PreferenceStore, SyncTrigger};
use tokio::sync::mpsc;

/// Shared application state, handed to every handler.
pub struct AppState {
    pub modules: Arc<ModuleManager>,
    pub preferences: Arc<dyn PreferenceStore>,
    /// `None` when cloud sync is disabled.
    pub sync: Option<SyncHandle>,
}

/// Cloud sync services, present when the reconciler runs.
pub struct SyncHandle {
    pub reconciler: Arc<CloudReconciler>,
    /// Queue feeding the background sync worker.
    pub triggers: mpsc::Sender<SyncTrigger>,
}
