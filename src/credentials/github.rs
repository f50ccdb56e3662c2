//! GitHub Actions repository secrets.
//!
//! Secrets are write-only. A value is sealed against the repository's
//! libsodium public key before upload:
//!
//! 1. `GET /repos/{repo}/actions/secrets/public-key`
//! 2. sealed-box encrypt the value, base64 the ciphertext
//! 3. `PUT /repos/{repo}/actions/secrets/{name}` with the ciphertext and key id

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use crypto_box::PublicKey;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::CredentialStore;

const GITHUB_API_BASE: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";

#[derive(Debug, Deserialize)]
struct RepoPublicKey {
    key_id: String,
    key: String,
}

#[derive(Debug, Serialize)]
struct SecretUpdate<'a> {
    encrypted_value: &'a str,
    key_id: &'a str,
}

/// Sealed-box encrypt `value` for the base64-encoded X25519 `public_key`.
fn seal(public_key: &str, value: &str) -> Result<String> {
    let key_bytes: [u8; 32] = STANDARD
        .decode(public_key)
        .context("Repository public key is not valid base64")?
        .try_into()
        .map_err(|bytes: Vec<u8>| {
            anyhow::anyhow!("Repository public key has {} bytes, expected 32", bytes.len())
        })?;

    let sealed = PublicKey::from(key_bytes)
        .seal(&mut rand::rngs::OsRng, value.as_bytes())
        .map_err(|_| anyhow::anyhow!("Failed to seal secret value"))?;
    Ok(STANDARD.encode(sealed))
}

/// Writes secrets to one repository (`owner/name`).
pub struct GithubSecretStore {
    client: Client,
    base_url: String,
    repo: String,
    token: SecretString,
}

impl GithubSecretStore {
    pub fn new(repo: impl Into<String>, token: SecretString) -> Self {
        Self {
            client: Client::new(),
            base_url: GITHUB_API_BASE.to_string(),
            repo: repo.into(),
            token,
        }
    }

    /// Override API base URL (useful for tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/actions/secrets/{}",
            self.base_url.trim_end_matches('/'),
            self.repo,
            path
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(
                "Authorization",
                format!("Bearer {}", self.token.expose_secret()),
            )
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .header("User-Agent", concat!("qbo-credits/", env!("CARGO_PKG_VERSION")))
    }

    async fn public_key(&self) -> Result<RepoPublicKey> {
        let response = self
            .authorized(self.client.get(self.url("public-key")))
            .send()
            .await
            .context("GitHub public key request failed")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read GitHub response body")?;
        if !status.is_success() {
            anyhow::bail!("GitHub public key request failed ({status}): {body}");
        }

        serde_json::from_str(&body).context("Failed to parse GitHub public key response")
    }
}

#[async_trait]
impl CredentialStore for GithubSecretStore {
    fn name(&self) -> &str {
        "github-actions"
    }

    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        anyhow::bail!("GitHub Actions secrets are write-only (cannot read {key})")
    }

    async fn set(&self, key: &str, value: SecretString) -> Result<()> {
        let public_key = self.public_key().await?;
        let encrypted_value = seal(&public_key.key, value.expose_secret())?;

        let response = self
            .authorized(self.client.put(self.url(key)))
            .json(&SecretUpdate {
                encrypted_value: &encrypted_value,
                key_id: &public_key.key_id,
            })
            .send()
            .await
            .context("GitHub secret update request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("GitHub secret update failed ({status}): {body}");
        }

        tracing::debug!(repo = %self.repo, secret = key, "Updated GitHub Actions secret");
        Ok(())
    }
}
