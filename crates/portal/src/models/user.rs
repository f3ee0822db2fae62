//! Generic user accounts.
//!
//! The `users` table is shared with the other applications on the same
//! database (shop customers, pharmacists, administrators). The portal only
//! reads it to check roles and writes it when linking a delivery agent.

use chrono::{DateTime, Utc};

use courier_portal_core::{Email, IdentityId, UserId, UserRole};

/// A generic user account (domain type).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// Display name.
    pub name: Option<String>,
    /// Account role; only [`UserRole::DeliveryAgent`] may use the portal.
    pub role: UserRole,
    /// Identity-provider account linked to this user, if any.
    pub identity_id: Option<IdentityId>,
    /// Whether the email has been verified.
    pub is_verified: bool,
    /// Whether the account is enabled.
    pub is_active: bool,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether this account is allowed into the courier portal.
    #[must_use]
    pub fn is_delivery_agent(&self) -> bool {
        self.role == UserRole::DeliveryAgent
    }
}

/// Values for inserting a user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: Email,
    pub name: Option<String>,
    pub role: UserRole,
    pub identity_id: Option<IdentityId>,
    pub is_verified: bool,
}
