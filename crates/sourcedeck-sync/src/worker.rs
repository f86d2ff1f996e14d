//! Sync worker: runs the reconciler whenever something calls for it.
//!
//! Three sources feed the worker: the cloud store's external change
//! stream, the local preference store's change stream, and an explicit
//! trigger channel (launch, foreground, background). Triggers are
//! processed one at a time in arrival order.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::events::{ChangeOrigin, SyncTrigger};
use crate::reconciler::CloudReconciler;

/// Spawn the worker. Sending `true` on `shutdown` stops it after a final
/// push of local state.
pub fn spawn_sync_worker(
    reconciler: Arc<CloudReconciler>,
    mut triggers: mpsc::Receiver<SyncTrigger>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let mut cloud_changes = reconciler.cloud().subscribe();
    let mut preference_changes = reconciler.preferences().subscribe();

    tokio::spawn(async move {
        tracing::info!("sync worker started");
        let mut cloud_open = true;
        let mut preferences_open = true;
        let mut triggers_open = true;

        loop {
            let trigger = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                change = cloud_changes.recv(), if cloud_open => match change {
                    Ok(change) => {
                        tracing::debug!(reason = ?change.reason, keys = change.keys.len(), "cloud store changed");
                        SyncTrigger::CloudChanged
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "sync worker lagged behind cloud changes");
                        SyncTrigger::CloudChanged
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        cloud_open = false;
                        continue;
                    }
                },
                change = preference_changes.recv(), if preferences_open => match change {
                    // Values the reconciler itself applied must not echo back.
                    Ok(change) if change.origin == ChangeOrigin::Sync => continue,
                    Ok(change) => {
                        tracing::debug!(key = %change.key, "local preference changed");
                        SyncTrigger::PreferencesChanged
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "sync worker lagged behind preference changes");
                        SyncTrigger::PreferencesChanged
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        preferences_open = false;
                        continue;
                    }
                },
                trigger = triggers.recv(), if triggers_open => match trigger {
                    Some(trigger) => trigger,
                    None => {
                        triggers_open = false;
                        continue;
                    }
                },
            };

            let report = reconciler.handle(trigger).await;
            if !report.is_clean() {
                tracing::warn!(?trigger, errors = ?report.errors, "sync run finished with errors");
            }
        }

        tracing::info!("sync worker stopping, pushing local state");
        reconciler.handle(SyncTrigger::Background).await;
        tracing::info!("sync worker stopped");
    })
}
