//! One guest's view of one invitation's guestbook.
//!
//! Binds the submission machine, the live feed and the reveal window to a
//! single backend chosen when the session opens.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::GuestbookError;
use crate::models::{Attendance, Wish, WishDraft};
use crate::services::feed::{subscribe_with_token, FeedSnapshot, FeedSubscription};
use crate::services::store::{BackendSelector, GuestbookStore};
use crate::services::submission::{
    StateKind, SubmissionState, Submission, SubmitOutcome, DEFAULT_CALL_TIMEOUT,
};
use crate::services::window::{WishWindow, DEFAULT_INITIAL_WINDOW, DEFAULT_WINDOW_STEP};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub request_timeout: Duration,
    pub initial_window: usize,
    pub window_step: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_CALL_TIMEOUT,
            initial_window: DEFAULT_INITIAL_WINDOW,
            window_step: DEFAULT_WINDOW_STEP,
        }
    }
}

/// What the presentation layer renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub invitation_id: String,
    pub state: StateKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_wish: Option<Wish>,
    pub visible_wishes: Vec<Wish>,
    pub visible_count: usize,
    pub total: usize,
    pub has_more: bool,
    pub is_preview: bool,
}

pub struct GuestSession {
    store: Arc<dyn GuestbookStore>,
    submission: Submission,
    feed: FeedSubscription,
    window: WishWindow,
    draft: WishDraft,
    is_preview: bool,
    cancel: CancellationToken,
}

impl GuestSession {
    /// Opens a session and re-derives any earlier submission for this guest.
    ///
    /// A failed restore is logged and leaves the session idle.
    pub async fn open(
        selector: &BackendSelector,
        invitation_id: &str,
        guest_name: &str,
        config: &SessionConfig,
    ) -> Self {
        let store = selector.select(invitation_id);
        let is_preview = selector.is_preview(invitation_id);
        let cancel = CancellationToken::new();

        let submission = Submission::new(Arc::clone(&store), invitation_id, guest_name)
            .with_timeout(config.request_timeout)
            .with_cancellation(cancel.child_token());
        let feed = subscribe_with_token(Arc::clone(&store), invitation_id, cancel.child_token());
        let window = WishWindow::new(invitation_id, config.initial_window, config.window_step);

        debug!(
            invitation_id,
            backend = store.backend(),
            is_preview,
            "Guest session opened"
        );

        if let Err(e) = submission.restore().await {
            warn!(
                invitation_id,
                name_key = %submission.name_key(),
                error = %e,
                "Could not restore submission state"
            );
        }

        Self {
            store,
            submission,
            feed,
            window,
            draft: WishDraft::default(),
            is_preview,
            cancel,
        }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub fn is_preview(&self) -> bool {
        self.is_preview
    }

    pub fn state(&self) -> SubmissionState {
        self.submission.state()
    }

    pub fn draft(&self) -> &WishDraft {
        &self.draft
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.draft.message = message.into();
    }

    pub fn set_attendance(&mut self, attendance: Option<Attendance>) {
        self.draft.attendance = attendance;
    }

    /// Submits the current draft. The draft is cleared once this call wrote it.
    pub async fn submit(&mut self) -> Result<SubmitOutcome, GuestbookError> {
        let outcome = self.submission.submit(&self.draft).await?;
        if matches!(outcome, SubmitOutcome::Created(_)) {
            self.draft = WishDraft::default();
        }
        Ok(outcome)
    }

    /// Waits for the first feed read.
    pub async fn feed_ready(&mut self) -> Option<FeedSnapshot> {
        let snapshot = self.feed.loaded().await?;
        self.window.on_feed_resized(snapshot.len());
        Some(snapshot)
    }

    /// Waits for the next feed refresh.
    pub async fn feed_changed(&mut self) -> Option<FeedSnapshot> {
        let snapshot = self.feed.changed().await?;
        self.window.on_feed_resized(snapshot.len());
        Some(snapshot)
    }

    /// The viewer scrolled near the end of the rendered list.
    pub fn near_end(&mut self) -> usize {
        let total = self.feed.current().len();
        self.window.on_near_end(total)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let feed = self.feed.current();
        let state = self.submission.state();
        let total = feed.len();

        SessionSnapshot {
            invitation_id: self.window.invitation_id().to_string(),
            state: state.kind(),
            error: state.error().map(|e| e.code().to_string()),
            existing_wish: state.recorded_wish().cloned(),
            visible_wishes: self.window.visible(&feed.wishes).to_vec(),
            visible_count: self.window.visible_count(total),
            total,
            has_more: self.window.has_more(total),
            is_preview: self.is_preview,
        }
    }

    /// Releases the feed and abandons in-flight calls.
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.feed.unsubscribe();
    }
}

impl Drop for GuestSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
