//! Exactly-once wish submission for one guest on one invitation.
//!
//! State machine:
//!
//! ```text
//! Idle ──submit──▶ Submitting ──Created──────▶ Success          (terminal)
//!                      │      ──AlreadyExists─▶ AlreadySubmitted (terminal)
//!                      └──failure──▶ lookup ──found──▶ AlreadySubmitted
//!                                           └─absent─▶ Error ──submit──▶ lookup ▶ Submitting
//! ```
//!
//! A second `submit` while `Submitting` is a no-op. An empty identity key
//! puts the machine in a permanent `Error(NoIdentity)` without any store call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shared::identity::{normalize, NameKey};
use shared::validation::is_blank;

use crate::error::GuestbookError;
use crate::models::{CreateOutcome, NewWish, Wish, WishDraft};
use crate::services::store::GuestbookStore;

/// Default bound on a single store call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Submitting,
    Success(Wish),
    AlreadySubmitted(Wish),
    Error(GuestbookError),
}

/// State tag without payload, as exposed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Idle,
    Submitting,
    Success,
    AlreadySubmitted,
    Error,
}

impl SubmissionState {
    pub fn kind(&self) -> StateKind {
        match self {
            SubmissionState::Idle => StateKind::Idle,
            SubmissionState::Submitting => StateKind::Submitting,
            SubmissionState::Success(_) => StateKind::Success,
            SubmissionState::AlreadySubmitted(_) => StateKind::AlreadySubmitted,
            SubmissionState::Error(_) => StateKind::Error,
        }
    }

    /// `Success` and `AlreadySubmitted` are never left.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionState::Success(_) | SubmissionState::AlreadySubmitted(_)
        )
    }

    /// The recorded wish for this guest, once known.
    pub fn recorded_wish(&self) -> Option<&Wish> {
        match self {
            SubmissionState::Success(w) | SubmissionState::AlreadySubmitted(w) => Some(w),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&GuestbookError> {
        match self {
            SubmissionState::Error(e) => Some(e),
            _ => None,
        }
    }

    fn accepts_submit(&self) -> bool {
        match self {
            SubmissionState::Idle => true,
            SubmissionState::Error(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// What a `submit` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// This call wrote the guest's wish.
    Created(Wish),
    /// The guest already had a wish; carries the recorded one.
    AlreadySubmitted(Wish),
    /// Another submit is in flight or the machine is terminal.
    Ignored,
    /// The session was closed while the call was in flight.
    Cancelled,
}

/// Per-guest submission state machine.
pub struct Submission {
    store: Arc<dyn GuestbookStore>,
    invitation_id: String,
    guest_name: String,
    name_key: NameKey,
    call_timeout: Duration,
    state: watch::Sender<SubmissionState>,
    cancel: CancellationToken,
}

impl Submission {
    pub fn new(
        store: Arc<dyn GuestbookStore>,
        invitation_id: impl Into<String>,
        guest_name: impl Into<String>,
    ) -> Self {
        let guest_name = guest_name.into();
        let (state, _) = watch::channel(SubmissionState::Idle);
        Self {
            store,
            invitation_id: invitation_id.into(),
            name_key: normalize(&guest_name),
            guest_name,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            state,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Ties in-flight calls to an outer token; cancelling it abandons them.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn invitation_id(&self) -> &str {
        &self.invitation_id
    }

    pub fn name_key(&self) -> &NameKey {
        &self.name_key
    }

    pub fn state(&self) -> SubmissionState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SubmissionState> {
        self.state.subscribe()
    }

    /// Re-derives a terminal state from the store at session start.
    ///
    /// Only moves `Idle` to `AlreadySubmitted`; a lookup failure leaves the
    /// machine idle and is returned to the caller.
    pub async fn restore(&self) -> Result<Option<Wish>, GuestbookError> {
        if self.name_key.is_empty() {
            return Ok(None);
        }

        let existing = match self
            .call(self.store.get_by_key(&self.invitation_id, &self.name_key))
            .await
        {
            Some(result) => result?,
            None => return Ok(None),
        };

        if let Some(wish) = &existing {
            let adopted = self.state.send_if_modified(|state| {
                if *state == SubmissionState::Idle {
                    *state = SubmissionState::AlreadySubmitted(wish.clone());
                    true
                } else {
                    false
                }
            });
            if adopted {
                debug!(
                    invitation_id = %self.invitation_id,
                    name_key = %self.name_key,
                    "Restored existing submission"
                );
            }
        }
        Ok(existing)
    }

    /// Submits the draft at most once for this guest.
    pub async fn submit(&self, draft: &WishDraft) -> Result<SubmitOutcome, GuestbookError> {
        if self.name_key.is_empty() {
            self.state
                .send_replace(SubmissionState::Error(GuestbookError::NoIdentity));
            return Err(GuestbookError::NoIdentity);
        }
        if self.state.borrow().accepts_submit() && is_blank(&draft.message) {
            return Err(GuestbookError::Invalid(
                "message must not be empty".to_string(),
            ));
        }

        let mut previous = None;
        let began = self.state.send_if_modified(|state| {
            if state.accepts_submit() {
                previous = Some(std::mem::replace(state, SubmissionState::Submitting));
                true
            } else {
                false
            }
        });
        if !began {
            debug!(
                invitation_id = %self.invitation_id,
                name_key = %self.name_key,
                state = ?self.state.borrow().kind(),
                "Submit ignored"
            );
            return Ok(SubmitOutcome::Ignored);
        }

        // A previous attempt failed ambiguously: check before writing again.
        if matches!(previous, Some(SubmissionState::Error(_))) {
            match self
                .call(self.store.get_by_key(&self.invitation_id, &self.name_key))
                .await
            {
                None => return Ok(SubmitOutcome::Cancelled),
                Some(Ok(Some(existing))) => return Ok(self.adopt_existing(existing)),
                Some(Ok(None)) => {}
                Some(Err(e)) => return Err(self.fail(e)),
            }
        }

        let new_wish = NewWish {
            invitation_id: self.invitation_id.clone(),
            name: self.guest_name.clone(),
            name_key: self.name_key.clone(),
            message: draft.message.clone(),
            attendance: draft.attendance,
        };

        match self.call(self.store.try_create(new_wish)).await {
            None => Ok(SubmitOutcome::Cancelled),
            Some(Ok(CreateOutcome::Created(wish))) => {
                info!(
                    invitation_id = %self.invitation_id,
                    name_key = %self.name_key,
                    backend = self.store.backend(),
                    "Wish submitted"
                );
                self.state.send_replace(SubmissionState::Success(wish.clone()));
                Ok(SubmitOutcome::Created(wish))
            }
            Some(Ok(CreateOutcome::AlreadyExists(existing))) => Ok(self.adopt_existing(existing)),
            Some(Err(e)) if e.is_retryable() => self.disambiguate(e).await,
            Some(Err(e)) => Err(self.fail(e)),
        }
    }

    /// After an ambiguous failure, one lookup decides whether the write landed.
    async fn disambiguate(
        &self,
        failure: GuestbookError,
    ) -> Result<SubmitOutcome, GuestbookError> {
        warn!(
            invitation_id = %self.invitation_id,
            name_key = %self.name_key,
            error = %failure,
            "Submit failed, checking whether it landed"
        );
        match self
            .call(self.store.get_by_key(&self.invitation_id, &self.name_key))
            .await
        {
            None => Ok(SubmitOutcome::Cancelled),
            Some(Ok(Some(existing))) => Ok(self.adopt_existing(existing)),
            Some(Ok(None)) | Some(Err(_)) => Err(self.fail(failure)),
        }
    }

    fn adopt_existing(&self, existing: Wish) -> SubmitOutcome {
        info!(
            invitation_id = %self.invitation_id,
            name_key = %self.name_key,
            "Guest already submitted"
        );
        self.state
            .send_replace(SubmissionState::AlreadySubmitted(existing.clone()));
        SubmitOutcome::AlreadySubmitted(existing)
    }

    fn fail(&self, error: GuestbookError) -> GuestbookError {
        self.state.send_replace(SubmissionState::Error(error.clone()));
        error
    }

    /// Runs a store call under the timeout; `None` when cancelled.
    async fn call<T, F>(&self, fut: F) -> Option<Result<T, GuestbookError>>
    where
        F: Future<Output = Result<T, GuestbookError>>,
    {
        let timeout = self.call_timeout;
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = tokio::time::timeout(timeout, fut) => {
                Some(result.unwrap_or(Err(GuestbookError::Timeout(timeout))))
            }
        }
    }
}
