//! Wish repository backed by PostgreSQL.
//!
//! The unique constraint on `composite_key` is the one-wish-per-guest
//! guard. Creates run as `INSERT ... ON CONFLICT DO NOTHING` followed by a
//! read of the winning row inside the same transaction.

use async_trait::async_trait;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use domain::models::{CreateOutcome, NewWish, Wish};
use domain::services::{GuestbookStore, WishChanged};
use domain::GuestbookError;
use shared::identity::NameKey;

use crate::entities::{AttendanceDb, WishEntity};
use crate::metrics::QueryTimer;

/// NOTIFY channel carrying the invitation id of every new wish.
pub const WISH_CHANGES_CHANNEL: &str = "wish_changes";

const CHANGE_BUFFER: usize = 256;
const LISTENER_RETRY: Duration = Duration::from_secs(5);

const WISH_COLUMNS: &str =
    "id, composite_key, invitation_id, name, name_key, message, attendance, created_at";

/// Repository for wish database operations.
#[derive(Clone)]
pub struct WishRepository {
    pool: PgPool,
    changes: broadcast::Sender<WishChanged>,
    listening: Arc<AtomicBool>,
}

impl WishRepository {
    /// Creates a new WishRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            pool,
            changes,
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Forwards database notifications to local feed subscribers.
    ///
    /// While connected, changes committed by any instance reach this
    /// process's feeds. While disconnected, local writes are published
    /// directly and every (re)connect triggers a resync.
    pub fn spawn_change_listener(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let repo = self.clone();
        tokio::spawn(async move {
            repo.listen(cancel).await;
            repo.listening.store(false, Ordering::SeqCst);
        })
    }

    /// Whether a notification listener connection is currently up.
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    async fn listen(&self, cancel: CancellationToken) {
        loop {
            let connected = tokio::select! {
                _ = cancel.cancelled() => return,
                connected = self.connect_listener() => connected,
            };
            let mut listener = match connected {
                Ok(listener) => listener,
                Err(e) => {
                    warn!(error = %e, "Failed to start wish change listener, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(LISTENER_RETRY) => continue,
                    }
                }
            };
            self.listening.store(true, Ordering::SeqCst);
            // Anything committed while disconnected went unannounced.
            let _ = self.changes.send(WishChanged::Resync);
            info!(channel = WISH_CHANGES_CHANNEL, "Listening for wish changes");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Wish change listener stopped");
                        return;
                    }
                    received = listener.try_recv() => match received {
                        Ok(Some(notification)) => {
                            let _ = self
                                .changes
                                .send(WishChanged::invitation(notification.payload()));
                        }
                        Ok(None) => {
                            warn!("Wish change listener lost its connection, reconnecting");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "Wish change listener failed");
                            break;
                        }
                    },
                }
            }
            self.listening.store(false, Ordering::SeqCst);
        }
    }

    async fn connect_listener(&self) -> Result<PgListener, sqlx::Error> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(WISH_CHANGES_CHANNEL).await?;
        Ok(listener)
    }

    fn publish_local(&self, invitation_id: &str) {
        if !self.is_listening() {
            let _ = self.changes.send(WishChanged::invitation(invitation_id));
        }
    }

    /// Inserts the wish unless its composite key exists, returning the stored row.
    pub async fn insert_if_absent(&self, wish: &NewWish) -> Result<CreateOutcome, sqlx::Error> {
        let composite_key = wish.composite_key();
        // Columns come from the key itself so they always agree with it.
        let (invitation_id, name_key) = composite_key.parts();
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, WishEntity>(&format!(
            r#"
            INSERT INTO wishes (composite_key, invitation_id, name, name_key, message, attendance)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (composite_key) DO NOTHING
            RETURNING {WISH_COLUMNS}
            "#
        ))
        .bind(composite_key.as_str())
        .bind(invitation_id)
        .bind(&wish.name)
        .bind(name_key)
        .bind(&wish.message)
        .bind(wish.attendance.map(AttendanceDb::from))
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match inserted {
            Some(entity) => {
                sqlx::query("SELECT pg_notify($1, $2)")
                    .bind(WISH_CHANGES_CHANNEL)
                    .bind(invitation_id)
                    .execute(&mut *tx)
                    .await?;
                CreateOutcome::Created(entity.into())
            }
            None => {
                let existing = sqlx::query_as::<_, WishEntity>(&format!(
                    "SELECT {WISH_COLUMNS} FROM wishes WHERE composite_key = $1"
                ))
                .bind(composite_key.as_str())
                .fetch_one(&mut *tx)
                .await?;
                CreateOutcome::AlreadyExists(existing.into())
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    /// Find a wish by invitation and normalized guest name.
    pub async fn find_by_key(
        &self,
        invitation_id: &str,
        name_key: &NameKey,
    ) -> Result<Option<WishEntity>, sqlx::Error> {
        sqlx::query_as::<_, WishEntity>(&format!(
            "SELECT {WISH_COLUMNS} FROM wishes WHERE invitation_id = $1 AND name_key = $2"
        ))
        .bind(invitation_id)
        .bind(name_key.as_str())
        .fetch_optional(&self.pool)
        .await
    }

    /// All wishes of an invitation, newest first.
    pub async fn find_by_invitation(
        &self,
        invitation_id: &str,
    ) -> Result<Vec<WishEntity>, sqlx::Error> {
        sqlx::query_as::<_, WishEntity>(&format!(
            r#"
            SELECT {WISH_COLUMNS}
            FROM wishes
            WHERE invitation_id = $1
            ORDER BY created_at DESC, id
            "#
        ))
        .bind(invitation_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Number of wishes recorded for an invitation.
    pub async fn count_by_invitation(&self, invitation_id: &str) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM wishes WHERE invitation_id = $1")
            .bind(invitation_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}

#[async_trait]
impl GuestbookStore for WishRepository {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn try_create(&self, wish: NewWish) -> Result<CreateOutcome, GuestbookError> {
        if wish.name_key.is_empty() {
            return Err(GuestbookError::NoIdentity);
        }

        let timer = QueryTimer::new("wish_try_create");
        let result = self.insert_if_absent(&wish).await;
        timer.record();

        match result {
            Ok(outcome) => {
                if outcome.is_created() {
                    self.publish_local(&wish.invitation_id);
                }
                Ok(outcome)
            }
            // A unique index other than the ON CONFLICT target still means
            // the guest already has a row.
            Err(e) if is_unique_violation(&e) => {
                match self.get_by_key(&wish.invitation_id, &wish.name_key).await? {
                    Some(existing) => Ok(CreateOutcome::AlreadyExists(existing)),
                    None => Err(storage_error(e)),
                }
            }
            Err(e) => Err(storage_error(e)),
        }
    }

    async fn get_by_key(
        &self,
        invitation_id: &str,
        name_key: &NameKey,
    ) -> Result<Option<Wish>, GuestbookError> {
        let timer = QueryTimer::new("wish_find_by_key");
        let result = self.find_by_key(invitation_id, name_key).await;
        timer.record();
        Ok(result.map_err(storage_error)?.map(Into::into))
    }

    async fn query_by_invitation(
        &self,
        invitation_id: &str,
    ) -> Result<Vec<Wish>, GuestbookError> {
        let timer = QueryTimer::new("wish_find_by_invitation");
        let result = self.find_by_invitation(invitation_id).await;
        timer.record();
        Ok(result
            .map_err(storage_error)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    fn changes(&self) -> broadcast::Receiver<WishChanged> {
        self.changes.subscribe()
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// Maps a database error to the domain's storage error.
///
/// Check constraint violations are caller errors; everything else is
/// treated as a transient failure of the store.
pub fn storage_error(e: sqlx::Error) -> GuestbookError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23514") => {
            GuestbookError::Invalid(db.message().to_string())
        }
        _ => GuestbookError::Transient(e.to_string()),
    }
}
