//! Guestbook routes scoped to one invitation.
//!
//! Ids ending in the preview suffix are served by the in-memory demo
//! backend; everything else goes to the live store.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{info, warn};
use validator::Validate;

use domain::models::{sort_feed, Attendance, Wish, WishDraft};
use domain::services::{
    subscribe, FeedSubscription, GuestSession, SessionSnapshot, Submission, SubmitOutcome,
};
use domain::GuestbookError;
use shared::normalize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::metrics::{record_feed_stream_opened, record_submission};
use crate::middleware::RequestId;

#[derive(Debug, Deserialize)]
pub struct SubmitWishRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub message: String,
    pub attendance: Option<Attendance>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitStatus {
    Created,
    AlreadySubmitted,
}

#[derive(Debug, Serialize)]
pub struct SubmitWishResponse {
    pub status: SubmitStatus,
    pub wish: Wish,
}

#[derive(Debug, Serialize)]
pub struct WishListResponse {
    pub data: Vec<Wish>,
    pub total: usize,
}

impl From<Vec<Wish>> for WishListResponse {
    fn from(data: Vec<Wish>) -> Self {
        let total = data.len();
        Self { data, total }
    }
}

#[derive(Debug, Serialize)]
pub struct MyWishResponse {
    pub wish: Wish,
}

#[derive(Debug, Deserialize)]
pub struct GuestQuery {
    #[serde(default)]
    pub to: String,
}

#[derive(Debug, Deserialize)]
pub struct GuestbookQuery {
    #[serde(default)]
    pub to: String,
    pub visible: Option<usize>,
}

/// Bounds a store call by the configured guestbook timeout.
async fn bounded<T>(
    state: &AppState,
    call: impl Future<Output = Result<T, GuestbookError>>,
) -> Result<T, ApiError> {
    let limit = state.session.request_timeout;
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_) => Err(GuestbookError::Timeout(limit).into()),
    }
}

/// Sign the guestbook.
///
/// POST /api/v1/invitations/:invitation_id/wishes
///
/// At most one wish is recorded per guest name. A guest who already signed
/// gets 200 with the recorded wish instead of 201.
pub async fn submit_wish(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(invitation_id): Path<String>,
    Json(request): Json<SubmitWishRequest>,
) -> Result<(StatusCode, Json<SubmitWishResponse>), ApiError> {
    let store = state.selector.select(&invitation_id);
    let backend = store.backend();
    let submission = Submission::new(store, invitation_id.as_str(), request.name)
        .with_timeout(state.session.request_timeout);

    if submission.name_key().is_empty() {
        record_submission(GuestbookError::NoIdentity.code(), backend);
        return Err(GuestbookError::NoIdentity.into());
    }

    if let Err(e) = submission.restore().await {
        // The conditional create still protects the invariant.
        warn!(
            request_id = %request_id.0,
            invitation_id = %invitation_id,
            error = %e,
            "Could not check for an existing wish before submitting"
        );
    }
    if let Some(existing) = submission.state().recorded_wish() {
        record_submission("already_submitted", backend);
        return Ok((
            StatusCode::OK,
            Json(SubmitWishResponse {
                status: SubmitStatus::AlreadySubmitted,
                wish: existing.clone(),
            }),
        ));
    }

    let draft = WishDraft {
        message: request.message,
        attendance: request.attendance,
    };
    draft.validate()?;

    let outcome = match submission.submit(&draft).await {
        Ok(outcome) => outcome,
        Err(e) => {
            record_submission(e.code(), backend);
            return Err(e.into());
        }
    };

    match outcome {
        SubmitOutcome::Created(wish) => {
            record_submission("created", backend);
            info!(
                request_id = %request_id.0,
                invitation_id = %invitation_id,
                wish_id = %wish.id,
                "Guestbook signed"
            );
            Ok((
                StatusCode::CREATED,
                Json(SubmitWishResponse {
                    status: SubmitStatus::Created,
                    wish,
                }),
            ))
        }
        SubmitOutcome::AlreadySubmitted(wish) => {
            record_submission("already_submitted", backend);
            Ok((
                StatusCode::OK,
                Json(SubmitWishResponse {
                    status: SubmitStatus::AlreadySubmitted,
                    wish,
                }),
            ))
        }
        // A fresh machine never ignores or cancels its first submit.
        SubmitOutcome::Ignored | SubmitOutcome::Cancelled => {
            record_submission("ignored", backend);
            Err(ApiError::Internal(format!(
                "submission for {} ended without a result",
                invitation_id
            )))
        }
    }
}

/// List all wishes of an invitation, newest first.
///
/// GET /api/v1/invitations/:invitation_id/wishes
pub async fn list_wishes(
    State(state): State<AppState>,
    Path(invitation_id): Path<String>,
) -> Result<Json<WishListResponse>, ApiError> {
    let store = state.selector.select(&invitation_id);
    let mut wishes = bounded(&state, store.query_by_invitation(&invitation_id)).await?;
    wishes.retain(|w| w.invitation_id == invitation_id);
    sort_feed(&mut wishes);
    Ok(Json(wishes.into()))
}

/// The wish recorded for one guest.
///
/// GET /api/v1/invitations/:invitation_id/wishes/mine?to=<name>
pub async fn get_my_wish(
    State(state): State<AppState>,
    Path(invitation_id): Path<String>,
    Query(query): Query<GuestQuery>,
) -> Result<Json<MyWishResponse>, ApiError> {
    let name_key = normalize(&query.to);
    if name_key.is_empty() {
        return Err(GuestbookError::NoIdentity.into());
    }

    let store = state.selector.select(&invitation_id);
    bounded(&state, store.get_by_key(&invitation_id, &name_key))
        .await?
        .map(|wish| Json(MyWishResponse { wish }))
        .ok_or_else(|| ApiError::NotFound("No wish recorded for this guest".to_string()))
}

/// Everything a guest's guestbook page renders.
///
/// GET /api/v1/invitations/:invitation_id/guestbook?to=<name>&visible=<n>
pub async fn guestbook_snapshot(
    State(state): State<AppState>,
    Path(invitation_id): Path<String>,
    Query(query): Query<GuestbookQuery>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let mut session =
        GuestSession::open(&state.selector, &invitation_id, &query.to, &state.session).await;

    let limit = state.session.request_timeout;
    let loaded = tokio::time::timeout(limit, session.feed_ready()).await;
    if !matches!(loaded, Ok(Some(_))) {
        session.close();
        return Err(GuestbookError::Timeout(limit).into());
    }

    if let Some(requested) = query.visible {
        loop {
            let snapshot = session.snapshot();
            if snapshot.visible_count >= requested || !snapshot.has_more {
                break;
            }
            session.near_end();
        }
    }

    let snapshot = session.snapshot();
    session.close();
    Ok(Json(snapshot))
}

/// Live feed over Server-Sent Events.
///
/// GET /api/v1/invitations/:invitation_id/wishes/stream
///
/// Emits a `wishes` event with the full sorted list on connect and after
/// every change. The subscription ends when the client goes away.
pub async fn stream_wishes(
    State(state): State<AppState>,
    Path(invitation_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let store = state.selector.select(&invitation_id);
    record_feed_stream_opened(store.backend());
    info!(invitation_id = %invitation_id, backend = store.backend(), "Feed stream opened");

    let feed = subscribe(store, invitation_id);
    Sse::new(feed_events(feed)).keep_alive(KeepAlive::default())
}

fn feed_events(feed: FeedSubscription) -> impl Stream<Item = Result<Event, axum::Error>> {
    stream::unfold((feed, true), |(mut feed, first)| async move {
        let snapshot = if first {
            feed.loaded().await?
        } else {
            feed.changed().await?
        };
        let event = Event::default()
            .event("wishes")
            .id(snapshot.revision.to_string())
            .json_data(WishListResponse::from(snapshot.wishes));
        Some((event, (feed, false)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::services::MemoryGuestbook;
    use futures::StreamExt;
    use std::sync::Arc;

    #[test]
    fn test_submit_status_serialization() {
        assert_eq!(
            serde_json::to_string(&SubmitStatus::AlreadySubmitted).unwrap(),
            "\"already_submitted\""
        );
    }

    #[test]
    fn test_submit_request_defaults() {
        let request: SubmitWishRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert!(request.name.is_empty());
        assert!(request.attendance.is_none());
    }

    #[test]
    fn test_wish_list_total() {
        let response = WishListResponse::from(Vec::new());
        assert_eq!(response.total, 0);
    }

    #[tokio::test]
    async fn test_feed_events_stop_with_feed() {
        let store = Arc::new(MemoryGuestbook::new());
        let mut feed = subscribe(store, "wedding");
        feed.loaded().await.unwrap();
        feed.unsubscribe();

        let mut events = Box::pin(feed_events(feed));
        // The first snapshot is already loaded, then the stream ends.
        assert!(events.next().await.is_some());
        assert!(events.next().await.is_none());
    }
}
