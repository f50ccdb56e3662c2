//! Run configuration, read once from the environment.
//!
//! Every key is optional at load time. Run paths ask for what they need
//! through the `require_*` accessors, which fail with
//! [`ConfigError::Missing`] before any network call is made.

use std::collections::HashMap;

use chrono::FixedOffset;
use secrecy::SecretString;

use crate::clock::SystemClock;
use crate::credentials::{CredentialStore, GithubSecretStore, PassCredentialStore};
use crate::export::SmtpSettings;
use crate::qbo::QboEnvironment;

pub const ACCESS_TOKEN: &str = "ACCESS_TOKEN";
pub const REFRESH_TOKEN: &str = "REFRESH_TOKEN";
pub const REALM_ID: &str = "REALM_ID";
pub const CLIENT_ID: &str = "CLIENT_ID";
pub const CLIENT_SECRET: &str = "CLIENT_SECRET";
pub const QBO_ENVIRONMENT: &str = "QBO_ENVIRONMENT";
pub const QBO_BASE_URL: &str = "QBO_BASE_URL";
pub const OAUTH_TOKEN_URL: &str = "OAUTH_TOKEN_URL";
pub const SMTP_HOST: &str = "SMTP_HOST";
pub const SMTP_PORT: &str = "SMTP_PORT";
pub const SMTP_USER: &str = "SMTP_USER";
pub const SMTP_PASSWORD: &str = "SMTP_PASSWORD";
pub const EMAIL_TO: &str = "EMAIL_TO";
pub const EMAIL_FROM: &str = "EMAIL_FROM";
pub const GH_TOKEN: &str = "GH_TOKEN";
pub const GH_REPO: &str = "GH_REPO";
pub const GITHUB_API_URL: &str = "GITHUB_API_URL";
pub const PASS_ENTRY: &str = "PASS_ENTRY";
pub const REFRESH_TOKEN_SECRET_NAME: &str = "REFRESH_TOKEN_SECRET_NAME";
pub const COMPANY_UTC_OFFSET: &str = "COMPANY_UTC_OFFSET";

/// Every key the tool reads, in display order.
pub const KNOWN_KEYS: [&str; 20] = [
    ACCESS_TOKEN,
    REFRESH_TOKEN,
    REALM_ID,
    CLIENT_ID,
    CLIENT_SECRET,
    QBO_ENVIRONMENT,
    QBO_BASE_URL,
    OAUTH_TOKEN_URL,
    SMTP_HOST,
    SMTP_PORT,
    SMTP_USER,
    SMTP_PASSWORD,
    EMAIL_TO,
    EMAIL_FROM,
    GH_TOKEN,
    GH_REPO,
    GITHUB_API_URL,
    PASS_ENTRY,
    REFRESH_TOKEN_SECRET_NAME,
    COMPANY_UTC_OFFSET,
];

const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration: {key}")]
    Missing { key: &'static str },

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Values taken from the environment. Empty strings count as unset.
#[derive(Clone, Default)]
pub struct Config {
    values: HashMap<&'static str, String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut set: Vec<&str> = self.values.keys().copied().collect();
        set.sort_unstable();
        f.debug_struct("Config").field("set_keys", &set).finish()
    }
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let values = KNOWN_KEYS
            .iter()
            .filter_map(|&key| {
                lookup(key)
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .map(|v| (key, v))
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn require(&self, key: &'static str) -> Result<&str, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing { key })
    }

    fn require_secret(&self, key: &'static str) -> Result<SecretString, ConfigError> {
        self.require(key).map(|v| SecretString::from(v.to_string()))
    }

    pub fn environment(&self) -> Result<QboEnvironment, ConfigError> {
        match self.get(QBO_ENVIRONMENT) {
            None => Ok(QboEnvironment::default()),
            Some(raw) => QboEnvironment::parse(raw).ok_or_else(|| ConfigError::Invalid {
                key: QBO_ENVIRONMENT,
                reason: format!("{raw:?} is not 'production' or 'sandbox'"),
            }),
        }
    }

    /// Wall clock whose dates follow `COMPANY_UTC_OFFSET` (`-5`, `+05:30`,
    /// `-08:00`), or the host's local zone when unset.
    pub fn clock(&self) -> Result<SystemClock, ConfigError> {
        match self.get(COMPANY_UTC_OFFSET) {
            None => Ok(SystemClock::new()),
            Some(raw) => parse_utc_offset(raw)
                .map(SystemClock::with_offset)
                .ok_or_else(|| ConfigError::Invalid {
                    key: COMPANY_UTC_OFFSET,
                    reason: format!("{raw:?} is not an offset like -5 or +05:30"),
                }),
        }
    }

    pub fn qbo_base_url(&self) -> Option<&str> {
        self.get(QBO_BASE_URL)
    }

    pub fn oauth_token_url(&self) -> Option<&str> {
        self.get(OAUTH_TOKEN_URL)
    }

    pub fn require_realm_id(&self) -> Result<&str, ConfigError> {
        self.require(REALM_ID)
    }

    pub fn require_access_token(&self) -> Result<SecretString, ConfigError> {
        self.require_secret(ACCESS_TOKEN)
    }

    pub fn require_refresh_token(&self) -> Result<SecretString, ConfigError> {
        self.require_secret(REFRESH_TOKEN)
    }

    /// OAuth client ID and secret.
    pub fn require_client_credentials(&self) -> Result<(SecretString, SecretString), ConfigError> {
        Ok((
            self.require_secret(CLIENT_ID)?,
            self.require_secret(CLIENT_SECRET)?,
        ))
    }

    pub fn require_email_to(&self) -> Result<&str, ConfigError> {
        self.require(EMAIL_TO)
    }

    pub fn require_smtp(&self) -> Result<SmtpSettings, ConfigError> {
        let host = self.require(SMTP_HOST)?.to_string();
        let port = match self.get(SMTP_PORT) {
            None => DEFAULT_SMTP_PORT,
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: SMTP_PORT,
                reason: format!("{raw:?} is not a port number"),
            })?,
        };
        let username = self.require(SMTP_USER)?.to_string();
        let password = self.require_secret(SMTP_PASSWORD)?;
        let from = self.get(EMAIL_FROM).unwrap_or(&username).to_string();

        Ok(SmtpSettings {
            host,
            port,
            username,
            password,
            from,
        })
    }

    /// Name under which a rotated refresh token is stored.
    pub fn refresh_token_secret_name(&self) -> &str {
        self.get(REFRESH_TOKEN_SECRET_NAME).unwrap_or(REFRESH_TOKEN)
    }

    /// Secret store for rotated refresh tokens, if one is configured.
    ///
    /// GitHub takes precedence over pass when both are set.
    pub fn secret_store(&self) -> Option<Box<dyn CredentialStore>> {
        if let (Some(repo), Some(token)) = (self.get(GH_REPO), self.get(GH_TOKEN)) {
            let mut store = GithubSecretStore::new(repo, SecretString::from(token.to_string()));
            if let Some(base_url) = self.get(GITHUB_API_URL) {
                store = store.with_base_url(base_url);
            }
            return Some(Box::new(store));
        }

        self.get(PASS_ENTRY)
            .map(|entry| Box::new(PassCredentialStore::new(entry)) as Box<dyn CredentialStore>)
    }

    /// Every known key with whether it is set. Values are never exposed.
    pub fn key_status(&self) -> Vec<(&'static str, bool)> {
        KNOWN_KEYS.iter().map(|&k| (k, self.is_set(k))).collect()
    }
}

fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let (sign, digits) = match raw.as_bytes().first()? {
        b'-' => (-1, &raw[1..]),
        b'+' => (1, &raw[1..]),
        _ => (1, raw),
    };
    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None => (digits.parse::<i32>().ok()?, 0),
    };
    if !(0..60).contains(&minutes) || hours < 0 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_missing_and_blank_keys() {
        let cfg = config(&[(REALM_ID, "  "), (ACCESS_TOKEN, "tok")]);

        assert_eq!(
            cfg.require_realm_id(),
            Err(ConfigError::Missing { key: REALM_ID })
        );
        assert_eq!(cfg.require_access_token().unwrap().expose_secret(), "tok");
        assert_eq!(
            cfg.require_client_credentials().unwrap_err(),
            ConfigError::Missing { key: CLIENT_ID }
        );
    }

    #[test]
    fn test_environment_default_and_invalid() {
        assert_eq!(config(&[]).environment(), Ok(QboEnvironment::Production));
        assert_eq!(
            config(&[(QBO_ENVIRONMENT, "sandbox")]).environment(),
            Ok(QboEnvironment::Sandbox)
        );
        assert!(matches!(
            config(&[(QBO_ENVIRONMENT, "qa")]).environment(),
            Err(ConfigError::Invalid { key: QBO_ENVIRONMENT, .. })
        ));
    }

    #[test]
    fn test_company_offset() {
        assert_eq!(config(&[]).clock().unwrap().offset(), None);

        let eastern = config(&[(COMPANY_UTC_OFFSET, "-5")]).clock().unwrap();
        assert_eq!(eastern.offset(), FixedOffset::west_opt(5 * 3600));

        let india = config(&[(COMPANY_UTC_OFFSET, "+05:30")]).clock().unwrap();
        assert_eq!(india.offset(), FixedOffset::east_opt(5 * 3600 + 30 * 60));

        let pacific = config(&[(COMPANY_UTC_OFFSET, "-08:00")]).clock().unwrap();
        assert_eq!(pacific.offset(), FixedOffset::west_opt(8 * 3600));

        for bad in ["EST", "+5:75", "-30", "+"] {
            assert!(
                matches!(
                    config(&[(COMPANY_UTC_OFFSET, bad)]).clock(),
                    Err(ConfigError::Invalid { key: COMPANY_UTC_OFFSET, .. })
                ),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_smtp_settings() {
        let cfg = config(&[
            (SMTP_HOST, "smtp.example.com"),
            (SMTP_USER, "reports@example.com"),
            (SMTP_PASSWORD, "pw"),
        ]);
        let smtp = cfg.require_smtp().unwrap();
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.from, "reports@example.com");

        let cfg = config(&[
            (SMTP_HOST, "smtp.example.com"),
            (SMTP_PORT, "twenty-five"),
            (SMTP_USER, "u"),
            (SMTP_PASSWORD, "pw"),
        ]);
        assert!(matches!(
            cfg.require_smtp(),
            Err(ConfigError::Invalid { key: SMTP_PORT, .. })
        ));

        assert_eq!(
            config(&[(SMTP_HOST, "h")]).require_smtp().unwrap_err(),
            ConfigError::Missing { key: SMTP_USER }
        );
    }

    #[test]
    fn test_secret_store_selection() {
        assert!(config(&[]).secret_store().is_none());
        assert!(config(&[(GH_REPO, "acme/billing")]).secret_store().is_none());

        let github = config(&[(GH_REPO, "acme/billing"), (GH_TOKEN, "t"), (PASS_ENTRY, "qbo")]);
        assert_eq!(github.secret_store().unwrap().name(), "github-actions");

        let pass = config(&[(PASS_ENTRY, "qbo/oauth")]);
        assert_eq!(pass.secret_store().unwrap().name(), "pass");
    }

    #[test]
    fn test_secret_name_default() {
        assert_eq!(config(&[]).refresh_token_secret_name(), "REFRESH_TOKEN");
        assert_eq!(
            config(&[(REFRESH_TOKEN_SECRET_NAME, "QBO_REFRESH")]).refresh_token_secret_name(),
            "QBO_REFRESH"
        );
    }

    #[test]
    fn test_key_status_never_shows_values() {
        let cfg = config(&[(ACCESS_TOKEN, "secret-value")]);
        let status = cfg.key_status();
        assert_eq!(status.len(), KNOWN_KEYS.len());
        assert!(status.contains(&(ACCESS_TOKEN, true)));
        assert!(status.contains(&(REALM_ID, false)));
    }
}
