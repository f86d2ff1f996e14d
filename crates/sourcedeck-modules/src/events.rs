//! Module lifecycle events.
//!
//! Events carry no guarantees beyond "something changed, re-read the
//! catalog"; the ids and versions are there for logging and tests.

use serde::Serialize;
use uuid::Uuid;

/// Capacity of each manager's broadcast channel. Slow subscribers that
/// fall further behind than this see `RecvError::Lagged`.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ModuleEvent {
    Added {
        id: Uuid,
        source_name: String,
    },
    Removed {
        id: Uuid,
    },
    Updated {
        id: Uuid,
        old_version: String,
        new_version: String,
    },
    ActiveChanged {
        id: Uuid,
        is_active: bool,
    },
    /// Scripts missing after a catalog sync were fetched again.
    ScriptsRestored {
        count: usize,
    },
}

impl ModuleEvent {
    /// Stable event name, used as a log field.
    pub fn name(&self) -> &'static str {
        match self {
            ModuleEvent::Added { .. } => "module_added",
            ModuleEvent::Removed { .. } => "module_removed",
            ModuleEvent::Updated { .. } => "module_updated",
            ModuleEvent::ActiveChanged { .. } => "module_active_changed",
            ModuleEvent::ScriptsRestored { .. } => "module_scripts_restored",
        }
    }
}
