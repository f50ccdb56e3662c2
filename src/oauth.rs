//! OAuth2 access-token refresh against Intuit's token endpoint.
//!
//! Refreshing may hand back a new refresh token. When it does, the new value
//! must be written to a [`CredentialStore`] or the next run will present a
//! revoked token.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{info, warn};

use crate::credentials::CredentialStore;

const INTUIT_TOKEN_URL: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";

/// Tokens returned by a refresh.
#[derive(Debug)]
pub struct TokenSet {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    /// Access token lifetime in seconds.
    pub expires_in: Option<i64>,
    /// Refresh token lifetime in seconds.
    pub refresh_token_expires_in: Option<i64>,
    rotated: bool,
}

impl TokenSet {
    /// Build a token set, noting whether `refresh_token` differs from the
    /// token that was presented.
    pub fn new(
        access_token: SecretString,
        refresh_token: Option<SecretString>,
        presented: &SecretString,
    ) -> Self {
        let rotated = refresh_token
            .as_ref()
            .is_some_and(|new| new.expose_secret() != presented.expose_secret());
        Self {
            access_token,
            refresh_token,
            expires_in: None,
            refresh_token_expires_in: None,
            rotated,
        }
    }

    /// The new refresh token, only if the server rotated it.
    pub fn rotated_refresh_token(&self) -> Option<&SecretString> {
        if self.rotated {
            self.refresh_token.as_ref()
        } else {
            None
        }
    }
}

#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenSet>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    x_refresh_token_expires_in: Option<i64>,
}

/// Refresh-token grant with HTTP Basic client authentication.
pub struct IntuitTokenClient {
    client: Client,
    token_url: String,
    client_id: SecretString,
    client_secret: SecretString,
}

impl IntuitTokenClient {
    pub fn new(client_id: SecretString, client_secret: SecretString) -> Self {
        Self {
            client: Client::new(),
            token_url: INTUIT_TOKEN_URL.to_string(),
            client_id,
            client_secret,
        }
    }

    /// Override the token endpoint (useful for tests).
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }
}

#[async_trait]
impl TokenRefresher for IntuitTokenClient {
    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenSet> {
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(
                self.client_id.expose_secret(),
                Some(self.client_secret.expose_secret()),
            )
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose_secret()),
            ])
            .send()
            .await
            .context("Token refresh request failed")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read token refresh response")?;
        if !status.is_success() {
            anyhow::bail!("Token refresh failed ({status}): {body}");
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).context("Failed to parse token refresh response")?;

        let mut tokens = TokenSet::new(
            SecretString::from(parsed.access_token),
            parsed.refresh_token.map(SecretString::from),
            refresh_token,
        );
        tokens.expires_in = parsed.expires_in;
        tokens.refresh_token_expires_in = parsed.x_refresh_token_expires_in;
        Ok(tokens)
    }
}

/// Write a rotated refresh token to `store` under `secret_name`.
///
/// Returns whether a value was written. Failures are logged, never returned:
/// the access token in hand is still good for this run.
pub async fn persist_rotated_token(
    store: Option<&dyn CredentialStore>,
    secret_name: &str,
    tokens: &TokenSet,
) -> bool {
    let Some(rotated) = tokens.rotated_refresh_token() else {
        return false;
    };

    let Some(store) = store else {
        warn!("Refresh token was rotated but no secret store is configured; the new token is not saved");
        return false;
    };

    if !store.supports_write() {
        warn!(store = store.name(), "Secret store is read-only; rotated refresh token not saved");
        return false;
    }

    match store.set(secret_name, rotated.clone()).await {
        Ok(()) => {
            info!(store = store.name(), secret = secret_name, "Saved rotated refresh token");
            true
        }
        Err(err) => {
            warn!(
                store = store.name(),
                secret = secret_name,
                error = %format!("{err:#}"),
                "Failed to save rotated refresh token"
            );
            false
        }
    }
}
