//! Session-related types.

/// Session keys for authentication data.
pub mod keys {
    /// Key for the logged-in [`Identity`](crate::models::Identity).
    pub const CURRENT_IDENTITY: &str = "current_identity";

    /// Key for the OAuth state parameter (CSRF protection).
    pub const OAUTH_STATE: &str = "oauth_state";
}
