//! Mutual exclusion for credential refreshes.
//!
//! The gate is either idle or refreshing. Exactly one caller can hold the
//! `RefreshPermit` at a time; everyone else waits for the gate to return to
//! idle and then proceeds as a follower. Dropping the permit releases the
//! gate, so release happens on every exit path of the refresher.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RefreshGate {
    refreshing: Arc<watch::Sender<bool>>,
}

impl Default for RefreshGate {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshGate {
    pub fn new() -> Self {
        let (refreshing, _) = watch::channel(false);
        Self {
            refreshing: Arc::new(refreshing),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        *self.refreshing.borrow()
    }

    /// Become the refresher if the gate is idle, without waiting.
    pub fn try_acquire(&self) -> Option<RefreshPermit> {
        let acquired = self.refreshing.send_if_modified(|refreshing| {
            if *refreshing {
                false
            } else {
                *refreshing = true;
                true
            }
        });

        if acquired {
            debug!("Refresh gate acquired");
            Some(RefreshPermit {
                refreshing: Arc::clone(&self.refreshing),
            })
        } else {
            None
        }
    }

    /// Acquire the gate, or wait out the current holder.
    ///
    /// Returns `Some` when the caller became the refresher. Returns `None`
    /// once a refresh started by someone else has finished; the caller does
    /// not hold the gate in that case.
    pub async fn acquire(&self) -> Option<RefreshPermit> {
        if let Some(permit) = self.try_acquire() {
            return Some(permit);
        }
        self.wait_for_idle().await;
        None
    }

    /// Suspend until no refresh is in progress.
    pub async fn wait_for_idle(&self) {
        let mut rx = self.refreshing.subscribe();
        // The sender lives as long as `self`, so this cannot observe a close.
        let _ = rx.wait_for(|refreshing| !*refreshing).await;
    }
}

/// Proof of holding the gate. Releases it when dropped.
#[derive(Debug)]
pub struct RefreshPermit {
    refreshing: Arc<watch::Sender<bool>>,
}

impl Drop for RefreshPermit {
    fn drop(&mut self) {
        self.refreshing.send_replace(false);
        debug!("Refresh gate released");
    }
}
