//! Session gate extractors.
//!
//! `RequireIdentity` yields the identity-provider user stored in the session
//! at login. `RequireAgent` additionally resolves the linked agent without
//! writing anything and rejects wrong-role or inactive accounts.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::error::{AppError, set_sentry_user};
use crate::models::{Agent, Identity, session_keys};
use crate::services::IdentityReconciler;
use crate::state::AppState;

/// Extractor that requires an identity in the session.
///
/// # Example
///
/// ```rust,ignore
/// async fn sync(RequireIdentity(identity): RequireIdentity) -> impl IntoResponse {
///     identity.email.to_string()
/// }
/// ```
pub struct RequireIdentity(pub Identity);

impl<S> FromRequestParts<S> for RequireIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or(AppError::Unauthenticated)?;

        let identity: Identity = session
            .get(session_keys::CURRENT_IDENTITY)
            .await?
            .ok_or(AppError::Unauthenticated)?;

        Ok(Self(identity))
    }
}

/// The authenticated agent behind a request.
#[derive(Debug, Clone)]
pub struct CurrentAgent {
    pub identity: Identity,
    pub agent: Agent,
}

/// Extractor that requires an active delivery agent.
pub struct RequireAgent(pub CurrentAgent);

impl FromRequestParts<AppState> for RequireAgent {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireIdentity(identity) = RequireIdentity::from_request_parts(parts, state).await?;

        let agent = IdentityReconciler::new(state.store())
            .resolve_existing(&identity)
            .await?;

        set_sentry_user(&agent.id, Some(agent.email.as_str()));

        Ok(Self(CurrentAgent { identity, agent }))
    }
}

/// Store the signed-in identity in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_identity(
    session: &Session,
    identity: &Identity,
) -> Result<(), tower_sessions::session::Error> {
    session
        .insert(session_keys::CURRENT_IDENTITY, identity)
        .await
}

/// Remove the identity from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_identity(
    session: &Session,
) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<Identity>(session_keys::CURRENT_IDENTITY)
        .await?;
    Ok(())
}
