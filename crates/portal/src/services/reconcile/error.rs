//! Identity reconciliation error types.

use thiserror::Error;

use courier_portal_core::UserRole;

use crate::db::RepositoryError;

/// Errors that can occur while mapping an identity to an agent.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The linked user account has a role other than delivery agent.
    #[error("account role is {role}, not delivery_agent")]
    RoleMismatch {
        /// The account's actual role.
        role: UserRole,
    },

    /// The email is already bound to a different identity.
    #[error("email is already linked to a different identity")]
    EmailConflict,

    /// The identity has no agent profile yet.
    #[error("agent profile not found")]
    AgentNotFound,

    /// The agent profile is soft-disabled.
    #[error("agent account is inactive")]
    AgentInactive,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}
