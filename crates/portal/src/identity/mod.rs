//! Identity-provider OAuth client.
//!
//! The portal delegates sign-in to an external OAuth 2.0 / OIDC provider
//! using the authorization-code flow.
//!
//! # OAuth Flow
//!
//! 1. Generate the authorization URL with `authorization_url()`
//! 2. Redirect the agent to the provider's login page
//! 3. The provider redirects back with an authorization code
//! 4. Exchange the code for an access token with `exchange_code()`
//! 5. Fetch the user profile with `fetch_identity()`

mod types;

pub use types::{AccessToken, ProviderProfile};

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::config::IdentityProviderConfig;
use crate::models::Identity;
use types::TokenResponse;

/// Errors from the identity provider.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider rejected a request.
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// The provider returned a profile without an email.
    #[error("identity has no email address")]
    MissingEmail,

    /// The provider returned an unusable email.
    #[error("identity email is invalid: {0}")]
    InvalidEmail(String),
}

/// Client for the identity provider.
#[derive(Clone)]
pub struct IdentityClient {
    inner: Arc<IdentityClientInner>,
}

struct IdentityClientInner {
    client: reqwest::Client,
    issuer: String,
    client_id: String,
    client_secret: SecretString,
}

impl IdentityClient {
    /// Create a new identity-provider client.
    #[must_use]
    pub fn new(config: &IdentityProviderConfig) -> Self {
        Self {
            inner: Arc::new(IdentityClientInner {
                client: reqwest::Client::new(),
                issuer: config.issuer_url.trim_end_matches('/').to_owned(),
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
            }),
        }
    }

    /// Issuer base URL.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.inner.issuer
    }

    /// Generate the authorization URL for agent login.
    ///
    /// # Arguments
    ///
    /// * `redirect_uri` - The callback URL to return to after authentication
    /// * `state` - A random string stored in the session to prevent CSRF
    #[must_use]
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> String {
        format!(
            "{}/oauth2/auth?\
            response_type=code&\
            client_id={}&\
            redirect_uri={}&\
            scope=openid%20profile%20email&\
            state={}",
            self.inner.issuer,
            urlencoding::encode(&self.inner.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state)
        )
    }

    /// Generate the provider logout URL.
    #[must_use]
    pub fn logout_url(&self, redirect_uri: &str) -> String {
        format!(
            "{}/logout?redirect={}",
            self.inner.issuer,
            urlencoding::encode(redirect_uri)
        )
    }

    /// Exchange an authorization code for an access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token exchange fails.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<AccessToken, IdentityError> {
        let url = format!("{}/oauth2/token", self.inner.issuer);

        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.inner.client_id.as_str()),
            ("client_secret", self.inner.client_secret.expose_secret()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        let response = self.inner.client.post(&url).form(&params).send().await?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(IdentityError::OAuth(format!(
                "Token exchange failed: {text}"
            )));
        }

        let token: TokenResponse = response.json().await?;

        Ok(AccessToken {
            access_token: token.access_token,
            expires_in: token.expires_in,
            obtained_at: chrono::Utc::now().timestamp(),
        })
    }

    /// Fetch the signed-in user's profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the profile has no usable
    /// email.
    pub async fn fetch_identity(&self, access_token: &str) -> Result<Identity, IdentityError> {
        let url = format!("{}/oauth2/v2/user_profile", self.inner.issuer);

        let response = self
            .inner
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(IdentityError::OAuth(format!(
                "Profile request failed ({status}): {text}"
            )));
        }

        let profile: ProviderProfile = response.json().await?;
        Identity::try_from(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> IdentityClient {
        IdentityClient::new(&IdentityProviderConfig {
            issuer_url: "https://auth.example.com/".to_owned(),
            client_id: "portal app".to_owned(),
            client_secret: SecretString::from("unused"),
        })
    }

    #[test]
    fn test_authorization_url_encodes_params() {
        let url = client().authorization_url("https://portal.example.com/auth/callback", "abc");
        assert!(url.starts_with("https://auth.example.com/oauth2/auth?response_type=code&"));
        assert!(url.contains("client_id=portal%20app"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fportal.example.com%2Fauth%2Fcallback"));
        assert!(url.ends_with("&state=abc"));
    }

    #[test]
    fn test_logout_url() {
        assert_eq!(
            client().logout_url("https://portal.example.com"),
            "https://auth.example.com/logout?redirect=https%3A%2F%2Fportal.example.com"
        );
    }
}
