use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use domain::services::{BackendSelector, DemoGuestbook, GuestbookStore, SessionConfig};
use persistence::WishRepository;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{health, wishes};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub selector: BackendSelector,
    pub session: SessionConfig,
}

impl AppState {
    /// State backed by PostgreSQL, with the process-wide preview backend.
    pub fn new(config: Config, pool: PgPool) -> (Self, WishRepository) {
        let repository = WishRepository::new(pool.clone());
        let state = Self::with_live_store(config, pool, Arc::new(repository.clone()));
        (state, repository)
    }

    /// State with an arbitrary live store; the pool is only used for health probes.
    pub fn with_live_store(
        config: Config,
        pool: PgPool,
        live: Arc<dyn GuestbookStore>,
    ) -> Self {
        let selector = BackendSelector::new(
            live,
            Arc::new(DemoGuestbook::new()),
            config.guestbook.demo_suffix.clone(),
        );
        let session = config.guestbook.session_config();
        Self {
            pool,
            config: Arc::new(config),
            selector,
            session,
        }
    }

    /// Backend serving non-preview invitations.
    pub fn live_backend(&self) -> &'static str {
        self.selector.live().backend()
    }
}

pub fn create_app(config: Config, pool: PgPool) -> Router {
    let (state, _) = AppState::new(config, pool);
    router(state)
}

pub fn router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let guestbook_routes = Router::new()
        .route(
            "/api/v1/invitations/:invitation_id/wishes",
            post(wishes::submit_wish).get(wishes::list_wishes),
        )
        .route(
            "/api/v1/invitations/:invitation_id/wishes/mine",
            get(wishes::get_my_wish),
        )
        .route(
            "/api/v1/invitations/:invitation_id/guestbook",
            get(wishes::guestbook_snapshot),
        )
        // Timeouts would cut long-lived streams; the stream route sits outside.
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CompressionLayer::new());

    let stream_routes = Router::new().route(
        "/api/v1/invitations/:invitation_id/wishes/stream",
        get(wishes::stream_wishes),
    );

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(guestbook_routes)
        .merge(stream_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
