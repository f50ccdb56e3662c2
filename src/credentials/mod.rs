//! Secret storage for OAuth credentials.
//!
//! The refresh token rotates whenever the authorization server decides to
//! issue a new one. The rotated value has to land somewhere the next
//! scheduled run can read it, so stores are pluggable:
//!
//! - [`PassCredentialStore`]: a password-store entry with `name: value` fields.
//! - [`GithubSecretStore`]: a GitHub Actions repository secret (write-only).

mod github;
mod pass;

pub use github::GithubSecretStore;
pub use pass::PassCredentialStore;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;

/// A key-value store for credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Human-readable backend name for log messages.
    fn name(&self) -> &str;

    /// Retrieve a credential by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    /// Returns `Err` if the backend can't be read.
    async fn get(&self, key: &str) -> Result<Option<SecretString>>;

    /// Store a credential, replacing any previous value.
    async fn set(&self, key: &str, value: SecretString) -> Result<()>;

    /// Check if this store supports writes.
    fn supports_write(&self) -> bool {
        true
    }
}
