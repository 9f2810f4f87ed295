//! Live feed of wishes for one invitation.
//!
//! A subscription owns a background task that re-reads the invitation's
//! wishes whenever the store reports a change for it, and publishes the full
//! sorted list. The task stops when the subscription is released, on every
//! exit path including drop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::GuestbookError;
use crate::models::{sort_feed, Wish};
use crate::services::store::{GuestbookStore, WishChanged};

/// Delay before re-reading after a failed refresh.
const REFRESH_RETRY: Duration = Duration::from_secs(2);

/// Full feed contents as of one refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSnapshot {
    /// Sorted newest first, unconfirmed entries on top.
    pub wishes: Vec<Wish>,
    /// Number of refreshes delivered; 0 until the first read completes.
    pub revision: u64,
}

impl FeedSnapshot {
    pub fn is_loaded(&self) -> bool {
        self.revision > 0
    }

    pub fn len(&self) -> usize {
        self.wishes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wishes.is_empty()
    }
}

/// Handle to a running feed. Dropping it unsubscribes.
pub struct FeedSubscription {
    invitation_id: String,
    updates: watch::Receiver<FeedSnapshot>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Starts a live feed scoped to `invitation_id`.
pub fn subscribe(
    store: Arc<dyn GuestbookStore>,
    invitation_id: impl Into<String>,
) -> FeedSubscription {
    subscribe_with_token(store, invitation_id, CancellationToken::new())
}

/// Like [`subscribe`], tied to a caller-owned cancellation token.
pub fn subscribe_with_token(
    store: Arc<dyn GuestbookStore>,
    invitation_id: impl Into<String>,
    cancel: CancellationToken,
) -> FeedSubscription {
    let invitation_id = invitation_id.into();
    let (tx, rx) = watch::channel(FeedSnapshot::default());
    // Subscribe before the first read so no change can slip in between.
    let changes = store.changes();

    let task = tokio::spawn(run_feed(
        store,
        invitation_id.clone(),
        changes,
        tx,
        cancel.clone(),
    ));

    FeedSubscription {
        invitation_id,
        updates: rx,
        cancel,
        tasks: vec![task],
    }
}

/// Callback flavour: `on_update` receives every refreshed list.
pub fn subscribe_with<F>(
    store: Arc<dyn GuestbookStore>,
    invitation_id: impl Into<String>,
    on_update: F,
) -> FeedSubscription
where
    F: Fn(&[Wish]) + Send + 'static,
{
    let mut subscription = subscribe(store, invitation_id);
    let mut updates = subscription.updates.clone();
    let cancel = subscription.cancel.clone();

    let forwarder = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = updates.borrow_and_update().clone();
                    on_update(&snapshot.wishes);
                }
            }
        }
    });
    subscription.tasks.push(forwarder);
    subscription
}

impl FeedSubscription {
    pub fn invitation_id(&self) -> &str {
        &self.invitation_id
    }

    /// Latest snapshot without waiting.
    pub fn current(&self) -> FeedSnapshot {
        self.updates.borrow().clone()
    }

    /// Waits for the next refresh. Returns `None` once the feed has stopped.
    pub async fn changed(&mut self) -> Option<FeedSnapshot> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            changed = self.updates.changed() => {
                changed.ok()?;
                Some(self.updates.borrow_and_update().clone())
            }
        }
    }

    /// Waits until the first read has completed.
    pub async fn loaded(&mut self) -> Option<FeedSnapshot> {
        loop {
            let current = self.updates.borrow_and_update().clone();
            if current.is_loaded() {
                return Some(current);
            }
            self.changed().await?;
        }
    }

    /// A receiver that observes the same snapshots; useful for streaming.
    pub fn receiver(&self) -> watch::Receiver<FeedSnapshot> {
        self.updates.clone()
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stops the feed. Safe to call any number of times.
    pub fn unsubscribe(&mut self) {
        if !self.cancel.is_cancelled() {
            debug!(invitation_id = %self.invitation_id, "Feed unsubscribed");
        }
        self.cancel.cancel();
        self.tasks.clear();
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_feed(
    store: Arc<dyn GuestbookStore>,
    invitation_id: String,
    mut changes: broadcast::Receiver<WishChanged>,
    tx: watch::Sender<FeedSnapshot>,
    cancel: CancellationToken,
) {
    let mut revision = 0u64;

    loop {
        match refresh(store.as_ref(), &invitation_id).await {
            Ok(wishes) => {
                revision += 1;
                tx.send_replace(FeedSnapshot { wishes, revision });
            }
            Err(e) => {
                warn!(
                    invitation_id = %invitation_id,
                    backend = store.backend(),
                    error = %e,
                    "Feed refresh failed, keeping last snapshot"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tx.closed() => return,
                    _ = tokio::time::sleep(REFRESH_RETRY) => continue,
                }
            }
        }

        // Wait for a change that concerns this invitation.
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tx.closed() => return,
                event = changes.recv() => match event {
                    Ok(changed) if changed.affects(&invitation_id) => break,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(invitation_id = %invitation_id, skipped, "Feed lagged, refreshing");
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
            }
        }
    }
}

async fn refresh(
    store: &dyn GuestbookStore,
    invitation_id: &str,
) -> Result<Vec<Wish>, GuestbookError> {
    let mut wishes = store.query_by_invitation(invitation_id).await?;
    // Backends must already scope by invitation; never let a stray row through.
    wishes.retain(|w| w.invitation_id == invitation_id);
    sort_feed(&mut wishes);
    Ok(wishes)
}
