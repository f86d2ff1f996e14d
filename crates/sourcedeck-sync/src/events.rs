//! Sync triggers, change notifications and completion events.

use serde::{Deserialize, Serialize};

/// Capacity of the reconciler's and stores' broadcast channels.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// What caused a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// App launch: initial pull.
    Launch,
    /// App entering the foreground: pull.
    Foreground,
    /// App entering the background: push everything.
    Background,
    /// The cloud store reported an external change: pull.
    CloudChanged,
    /// A local preference changed: push preferences.
    PreferencesChanged,
}

/// Why the cloud store reported a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudChangeReason {
    /// Another device wrote.
    ServerChange,
    /// First sync after the cloud store was enabled.
    InitialSync,
    /// The signed-in account changed.
    AccountChanged,
}

/// Notification from a cloud store that its content changed externally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudChange {
    pub reason: CloudChangeReason,
    /// Keys reported as changed, when the store knows them.
    #[serde(default)]
    pub keys: Vec<String>,
}

/// Who wrote a preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    /// Any part of the application.
    Local,
    /// The reconciler, applying a cloud value.
    Sync,
}

/// Notification from the local preference store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreferenceChange {
    pub key: String,
    pub origin: ChangeOrigin,
}

/// Emitted by the reconciler when local state was replaced from the cloud.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// The local catalog file was replaced; reload module views.
    CatalogSynced,
    /// Local preference values were overwritten from the cloud.
    PreferencesSynced { changed: usize },
}
