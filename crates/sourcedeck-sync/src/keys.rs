//! Which preference keys are synchronised.
//!
//! The sync set is the explicit [`SYNC_KEYS`] list plus every other key
//! that is not under a [`RESERVED_PREFIXES`] entry. Values must be scalar
//! (bool, number, string) to be copied in either direction.

use std::collections::BTreeSet;

use serde_json::Value;

/// Named settings that are always part of the sync set.
pub const SYNC_KEYS: &[&str] = &[
    // player behaviour
    "externalPlayer",
    "alwaysLandscape",
    "rememberPlaySpeed",
    "holdSpeedPlayer",
    "skipIncrement",
    "skipIncrementHold",
    "holdForPauseEnabled",
    "skip85Visible",
    "doubleTapSeekEnabled",
    "hideNextButton",
    // layout
    "mediaColumnsPortrait",
    "mediaColumnsLandscape",
    "librarySortOrder",
    // module selection
    "selectedModuleId",
    // feature toggles
    "refreshModulesOnLaunch",
    "fetchEpisodeMetadata",
    "analyticsEnabled",
    "sendPushUpdates",
    "multiThreadsEnabled",
];

/// Playback progress keys, one per media item.
pub const PROGRESS_PREFIXES: &[&str] = &["progress_", "lastPlayedTime_", "totalTime_"];

/// Keys owned by the platform or by this process; never synced.
pub const RESERVED_PREFIXES: &[&str] = &["Apple", "NS", "com.apple.", "internal."];

pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_PREFIXES.iter().any(|p| key.starts_with(p))
}

pub fn is_progress_key(key: &str) -> bool {
    PROGRESS_PREFIXES.iter().any(|p| key.starts_with(p))
}

/// Bool, number or string. `null`, arrays and objects are not synced.
pub fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}

/// Whether a key/value pair may be copied between stores.
///
/// Progress keys carry seconds, so only numbers sync under them.
pub fn is_syncable(key: &str, value: &Value) -> bool {
    if is_progress_key(key) {
        return value.is_number();
    }
    !key.is_empty() && !is_reserved_key(key) && is_scalar(value)
}

/// The keys considered by one reconciliation run.
///
/// `discovered` holds every key currently present in the local and/or
/// cloud store; reserved ones are dropped.
pub fn sync_key_set<'a>(discovered: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    SYNC_KEYS
        .iter()
        .copied()
        .chain(discovered)
        .filter(|k| is_progress_key(k) || (!k.is_empty() && !is_reserved_key(k)))
        .map(str::to_string)
        .collect()
}
