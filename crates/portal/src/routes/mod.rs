//! HTTP route handlers for the portal.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                                   - Service status
//! GET  /unauthorized                       - Wrong-role landing (403)
//! GET  /health                             - Liveness
//! GET  /health/ready                       - Readiness (store ping)
//!
//! # Auth
//! GET  /auth/login                         - Redirect to the identity provider
//! GET  /auth/callback                      - OAuth callback
//! POST /auth/logout                        - Sign out
//! POST /api/auth/sync                      - Reconcile identity with agent records
//!
//! # Delivery (requires an active agent)
//! GET  /api/delivery/orders                - Available orders
//! GET  /api/delivery/orders/{id}           - Order detail
//! POST /api/delivery/orders/{id}/accept    - Claim an order
//! POST /api/delivery/orders/{id}/ignore    - Hide an order
//! POST /api/delivery/orders/{id}/dispatch  - Mark out for delivery
//! POST /api/delivery/orders/{id}/complete  - Mark delivered
//! GET  /api/delivery/accepted              - Orders in progress
//! GET  /api/delivery/delivered             - Delivered orders
//! GET  /api/delivery/ignored               - Ignored orders
//! GET  /api/delivery/history               - All assigned orders
//! GET  /api/delivery/profile               - Profile and stats
//! PUT  /api/delivery/profile               - Edit profile
//! POST /api/delivery/profile/upload        - Upload profile image
//! ```

pub mod auth;
pub mod listings;
pub mod orders;
pub mod profile;
pub mod views;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Request, State},
    http::StatusCode,
    middleware::from_fn,
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tower_sessions::SessionStore;

use crate::middleware::{
    api_rate_limiter, auth_rate_limiter, create_session_layer, request_id_middleware,
    security_headers_middleware,
};
use crate::services::profile::MAX_IMAGE_BYTES;
use crate::state::AppState;

/// Multipart overhead allowed on top of the image itself.
const UPLOAD_BODY_LIMIT: usize = MAX_IMAGE_BYTES + 1024 * 1024;

/// Create the sign-in routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login))
        .route("/callback", get(auth::callback))
        .route("/logout", post(auth::logout))
}

/// Create the delivery API router.
pub fn delivery_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(orders::available))
        .route("/orders/{id}", get(orders::detail))
        .route("/orders/{id}/accept", post(orders::accept))
        .route("/orders/{id}/ignore", post(orders::ignore))
        .route("/orders/{id}/dispatch", post(orders::dispatch))
        .route("/orders/{id}/complete", post(orders::complete))
        .route("/accepted", get(listings::accepted))
        .route("/delivered", get(listings::delivered))
        .route("/ignored", get(listings::ignored))
        .route("/history", get(listings::history))
        .route("/profile", get(profile::show).put(profile::update))
        .route(
            "/profile/upload",
            post(profile::upload).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
}

/// Create all routes for the portal.
///
/// Rate limiters key on proxy client-IP headers; pass `rate_limit = false`
/// when requests never carry them (tests, local runs without a proxy).
pub fn routes(rate_limit: bool) -> Router<AppState> {
    let mut auth = auth_routes();
    let mut api = Router::new()
        .route("/auth/sync", post(auth::sync))
        .nest("/delivery", delivery_routes());

    if rate_limit {
        auth = auth.layer(auth_rate_limiter());
        api = api.layer(api_rate_limiter());
    }

    Router::new()
        .route("/", get(index))
        .route("/unauthorized", get(unauthorized))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/auth", auth)
        .nest("/api", api)
}

/// Build the application with its middleware stack.
///
/// Sentry layers are added by the binary.
pub fn app<S>(state: AppState, session_store: S, rate_limit: bool) -> Router
where
    S: SessionStore + Clone,
{
    let session_layer = create_session_layer(session_store, state.config().is_https());

    routes(rate_limit)
        .layer(session_layer)
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
            )
        }))
        .with_state(state)
}

async fn index() -> Json<Value> {
    Json(json!({
        "service": "courier-portal",
        "status": "ok",
    }))
}

/// Landing page for signed-in accounts that are not delivery agents.
async fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "error": "Access denied. This portal is for delivery agents only",
        })),
    )
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().ping().await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            tracing::warn!(error = %err, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
