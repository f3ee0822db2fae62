//! Identity-provider wire types.

use serde::Deserialize;

use courier_portal_core::{Email, IdentityId};

use super::IdentityError;
use crate::models::Identity;

/// Token endpoint response.
#[derive(Debug, Deserialize)]
pub(super) struct TokenResponse {
    pub access_token: String,
    #[allow(dead_code)]
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
}

/// Access token obtained from a code exchange.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_in: Option<i64>,
    pub obtained_at: i64,
}

/// User profile as returned by the provider.
///
/// Providers disagree on field names; the common spellings are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderProfile {
    #[serde(alias = "sub")]
    pub id: String,
    #[serde(default, alias = "preferred_email")]
    pub email: Option<String>,
    #[serde(default, alias = "first_name")]
    pub given_name: Option<String>,
    #[serde(default, alias = "last_name")]
    pub family_name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

impl TryFrom<ProviderProfile> for Identity {
    type Error = IdentityError;

    fn try_from(profile: ProviderProfile) -> Result<Self, Self::Error> {
        let raw = profile
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or(IdentityError::MissingEmail)?;
        let email = Email::parse(&raw).map_err(|_| IdentityError::InvalidEmail(raw))?;

        Ok(Self {
            id: IdentityId::new(profile.id),
            email,
            given_name: non_blank(profile.given_name),
            family_name: non_blank(profile.family_name),
            picture: non_blank(profile.picture),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
