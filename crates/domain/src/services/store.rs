//! Guestbook store abstraction.
//!
//! Every backend keys wishes by [`CompositeKey`](crate::models::CompositeKey),
//! so "has this guest already submitted" and "create the first submission"
//! are one conditional create.

use std::sync::Arc;
use tokio::sync::broadcast;

use shared::identity::NameKey;

use crate::error::GuestbookError;
use crate::models::{CreateOutcome, NewWish, Wish};
use crate::services::demo::is_demo_invitation;

/// Notification that the wish set of an invitation changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WishChanged {
    Invitation(String),
    /// Changes may have gone unreported; every feed should re-read.
    Resync,
}

impl WishChanged {
    pub fn invitation(invitation_id: impl Into<String>) -> Self {
        WishChanged::Invitation(invitation_id.into())
    }

    /// Whether a feed of `invitation_id` has to refresh.
    pub fn affects(&self, invitation_id: &str) -> bool {
        match self {
            WishChanged::Invitation(changed) => changed == invitation_id,
            WishChanged::Resync => true,
        }
    }
}

/// Document store for wishes plus the change stream that feeds live views.
#[async_trait::async_trait]
pub trait GuestbookStore: Send + Sync {
    /// Backend name, used in logs.
    fn backend(&self) -> &'static str;

    /// Atomically creates the wish unless one exists for the same composite key.
    ///
    /// Concurrent calls for one key resolve so that exactly one observes
    /// `Created`; the rest observe `AlreadyExists` with the winner's record.
    /// Transport failures are returned as-is and never retried here.
    async fn try_create(&self, wish: NewWish) -> Result<CreateOutcome, GuestbookError>;

    /// Point lookup by composite key.
    async fn get_by_key(
        &self,
        invitation_id: &str,
        name_key: &NameKey,
    ) -> Result<Option<Wish>, GuestbookError>;

    /// All wishes of one invitation, in no particular order.
    async fn query_by_invitation(&self, invitation_id: &str)
        -> Result<Vec<Wish>, GuestbookError>;

    /// Subscribes to change notifications for all invitations.
    fn changes(&self) -> broadcast::Receiver<WishChanged>;
}

/// Chooses between the real and the preview backend for an invitation.
///
/// The choice is made once per session, by invitation id suffix.
#[derive(Clone)]
pub struct BackendSelector {
    live: Arc<dyn GuestbookStore>,
    demo: Arc<dyn GuestbookStore>,
    demo_suffix: String,
}

impl BackendSelector {
    pub fn new(
        live: Arc<dyn GuestbookStore>,
        demo: Arc<dyn GuestbookStore>,
        demo_suffix: impl Into<String>,
    ) -> Self {
        Self {
            live,
            demo,
            demo_suffix: demo_suffix.into(),
        }
    }

    /// Store serving every non-preview invitation.
    pub fn live(&self) -> &Arc<dyn GuestbookStore> {
        &self.live
    }

    pub fn is_preview(&self, invitation_id: &str) -> bool {
        is_demo_invitation(invitation_id, &self.demo_suffix)
    }

    pub fn select(&self, invitation_id: &str) -> Arc<dyn GuestbookStore> {
        if self.is_preview(invitation_id) {
            Arc::clone(&self.demo)
        } else {
            Arc::clone(&self.live)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::demo::{DemoGuestbook, DEFAULT_DEMO_SUFFIX};
    use crate::services::memory::MemoryGuestbook;

    fn selector() -> BackendSelector {
        BackendSelector::new(
            Arc::new(MemoryGuestbook::new()),
            Arc::new(DemoGuestbook::new()),
            DEFAULT_DEMO_SUFFIX,
        )
    }

    #[test]
    fn test_select_by_suffix() {
        let selector = selector();
        assert_eq!(selector.select("acme-demo").backend(), "demo");
        assert_eq!(selector.select("acme").backend(), "memory");
        assert_eq!(selector.select("demo-acme").backend(), "memory");
    }

    #[test]
    fn test_is_preview() {
        let selector = selector();
        assert!(selector.is_preview("wedding-demo"));
        assert!(!selector.is_preview("wedding"));
    }
}
