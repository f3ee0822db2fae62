//! Sign-in with the identity provider and identity sync.
//!
//! - Login: redirect to the provider's authorization page
//! - Callback: verify state, exchange the code, reconcile the identity
//! - Logout: clear the session and redirect to the provider's logout
//! - Sync: reconcile the session identity on demand

use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::error::{AppError, Result, clear_sentry_user};
use crate::middleware::{RequireIdentity, clear_current_identity, set_current_identity};
use crate::models::{Agent, session_keys};
use crate::services::{IdentityReconciler, ReconcileError};
use crate::state::AppState;

/// Query parameters from the OAuth callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    /// CSRF state echoed back by the provider.
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Generate a random alphanumeric string.
fn generate_random_string(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET.get(idx).map_or('0', |b| char::from(*b))
        })
        .collect()
}

/// Start the OAuth flow.
///
/// # Route
///
/// `GET /auth/login`
pub async fn login(State(state): State<AppState>, session: Session) -> Result<Redirect> {
    let oauth_state = generate_random_string(32);
    session.insert(session_keys::OAUTH_STATE, &oauth_state).await?;

    let auth_url = state
        .identity()
        .authorization_url(&state.config().callback_url(), &oauth_state);

    Ok(Redirect::to(&auth_url))
}

/// Handle the OAuth callback.
///
/// # Route
///
/// `GET /auth/callback`
pub async fn callback(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<CallbackQuery>,
) -> Result<Response> {
    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_default();
        tracing::warn!(error = %error, description = %description, "Identity provider denied login");
        return Err(AppError::BadRequest("Login was cancelled".to_owned()));
    }

    let code = query
        .code
        .ok_or_else(|| AppError::BadRequest("Missing authorization code".to_owned()))?;
    let returned_state = query
        .state
        .ok_or_else(|| AppError::BadRequest("Missing state parameter".to_owned()))?;

    // One-time use
    let stored_state: Option<String> = session.remove(session_keys::OAUTH_STATE).await?;
    if stored_state.as_deref() != Some(returned_state.as_str()) {
        tracing::warn!("OAuth state mismatch");
        return Err(AppError::BadRequest("Invalid state parameter".to_owned()));
    }

    let token = state
        .identity()
        .exchange_code(&code, &state.config().callback_url())
        .await?;
    let identity = state.identity().fetch_identity(&token.access_token).await?;

    // Rotate the session id on privilege change
    session.cycle_id().await?;
    set_current_identity(&session, &identity).await?;

    match IdentityReconciler::new(state.store()).reconcile(&identity).await {
        Ok(outcome) => {
            tracing::info!(agent_id = %outcome.agent.id, "Agent signed in");
            Ok(Redirect::to("/").into_response())
        }
        Err(ReconcileError::RoleMismatch { role }) => {
            tracing::warn!(identity_id = %identity.id, role = %role, "Non-agent account signed in");
            Ok(Redirect::to("/unauthorized").into_response())
        }
        Err(err) => Err(err.into()),
    }
}

/// Sign out locally and at the provider.
///
/// # Route
///
/// `POST /auth/logout`
pub async fn logout(State(state): State<AppState>, session: Session) -> Result<Redirect> {
    clear_current_identity(&session).await?;
    session.flush().await?;
    clear_sentry_user();

    let post_logout_uri = format!("{}/", state.config().base_url);
    Ok(Redirect::to(&state.identity().logout_url(&post_logout_uri)))
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub agent: Agent,
    pub message: &'static str,
}

/// Reconcile the session identity with the local agent records.
///
/// # Route
///
/// `POST /api/auth/sync`
pub async fn sync(
    State(state): State<AppState>,
    RequireIdentity(identity): RequireIdentity,
) -> Result<Json<SyncResponse>> {
    let outcome = IdentityReconciler::new(state.store())
        .reconcile(&identity)
        .await?;

    Ok(Json(SyncResponse {
        success: true,
        message: outcome.kind.message(),
        agent: outcome.agent,
    }))
}
