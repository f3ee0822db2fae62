//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server faults to Sentry
//! before responding to the client. All route handlers return
//! `Result<T, AppError>`; failures are rendered as `{"error": "..."}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::identity::IdentityError;
use crate::services::{OrderError, ProfileError, ReconcileError};

/// Application-level error type for the portal.
#[derive(Debug, Error)]
pub enum AppError {
    /// No identity in the session.
    #[error("Unauthorized")]
    Unauthenticated,

    /// Identity reconciliation or agent resolution failed.
    #[error("Reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Order action failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Profile action failed.
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    /// Identity provider call failed.
    #[error("Identity provider error: {0}")]
    Identity(#[from] IdentityError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Reconcile(err) => match err {
                ReconcileError::RoleMismatch { .. }
                | ReconcileError::AgentNotFound
                | ReconcileError::AgentInactive => StatusCode::FORBIDDEN,
                ReconcileError::EmailConflict => StatusCode::CONFLICT,
                ReconcileError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Order(err) => match err {
                OrderError::OrderNotFound => StatusCode::NOT_FOUND,
                OrderError::OrderUnavailable | OrderError::InvalidTransition { .. } => {
                    StatusCode::CONFLICT
                }
                OrderError::NotAssigned => StatusCode::FORBIDDEN,
                OrderError::AssignmentFailed(_) | OrderError::Repository(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Profile(err) => match err {
                ProfileError::Validation(_) => StatusCode::BAD_REQUEST,
                ProfileError::Storage(_) | ProfileError::Repository(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Identity(err) => match err {
                IdentityError::MissingEmail | IdentityError::InvalidEmail(_) => {
                    StatusCode::BAD_REQUEST
                }
                IdentityError::Http(_) | IdentityError::OAuth(_) => StatusCode::BAD_GATEWAY,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message shown to the client. Server faults stay generic.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Unauthenticated => "Unauthorized".to_owned(),
            Self::Reconcile(err) => match err {
                ReconcileError::RoleMismatch { role } => {
                    format!("Access denied. This portal is for delivery agents only (account role: {role})")
                }
                ReconcileError::EmailConflict => {
                    "Email is already linked to a different account".to_owned()
                }
                ReconcileError::AgentNotFound => "Agent profile not found".to_owned(),
                ReconcileError::AgentInactive => "Agent account is inactive".to_owned(),
                ReconcileError::Repository(_) => "Internal server error".to_owned(),
            },
            Self::Order(err) => match err {
                OrderError::OrderNotFound => "Order not found".to_owned(),
                OrderError::OrderUnavailable => "Order is no longer available".to_owned(),
                OrderError::AssignmentFailed(_) => "Failed to assign order".to_owned(),
                OrderError::NotAssigned => "Order is not assigned to you".to_owned(),
                OrderError::InvalidTransition { from, to } => {
                    format!("Order cannot move from {from} to {to}")
                }
                OrderError::Repository(_) => "Internal server error".to_owned(),
            },
            Self::Profile(err) => match err {
                ProfileError::Validation(msg) => msg.clone(),
                ProfileError::Storage(_) => "Failed to upload file".to_owned(),
                ProfileError::Repository(_) => "Internal server error".to_owned(),
            },
            Self::Identity(err) => match err {
                IdentityError::MissingEmail | IdentityError::InvalidEmail(_) => {
                    "Your account has no usable email address".to_owned()
                }
                _ => "Identity provider error".to_owned(),
            },
            Self::BadRequest(msg) => msg.clone(),
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                "Internal server error".to_owned()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        (status, Json(json!({ "error": self.client_message() }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for the current agent.
pub fn set_sentry_user(agent_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(agent_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the agent.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}
