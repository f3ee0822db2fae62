//! The identity-provider account behind a session.

use serde::{Deserialize, Serialize};

use courier_portal_core::{Email, IdentityId};

/// An authenticated identity-provider user.
///
/// Not persisted by the portal; it lives in the session after login and is
/// re-read on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable provider account id.
    pub id: IdentityId,
    pub email: Email,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    /// Avatar URL.
    pub picture: Option<String>,
}

impl Identity {
    /// Name used when creating rows for this identity.
    ///
    /// Given and family name joined with a space, falling back to the email
    /// when the provider supplied neither.
    #[must_use]
    pub fn display_name(&self) -> String {
        let name = [self.given_name.as_deref(), self.family_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if name.is_empty() {
            self.email.to_string()
        } else {
            name
        }
    }
}
