//! QuickBooks Online query API client.
//!
//! Every entity collection is read through a single query endpoint that
//! accepts a SQL-like statement (`SELECT * FROM Payment STARTPOSITION 1
//! MAXRESULTS 1000`). The response envelope maps the entity name to the list
//! of matching entities.

pub mod models;
mod paginate;

pub use paginate::{fetch_all, EntityQuery, DEFAULT_PAGE_SIZE, MAX_PAGES};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value};

const QBO_PRODUCTION_BASE: &str = "https://quickbooks.api.intuit.com";
const QBO_SANDBOX_BASE: &str = "https://sandbox-quickbooks.api.intuit.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QboEnvironment {
    #[default]
    Production,
    Sandbox,
}

impl QboEnvironment {
    pub fn base_url(self) -> &'static str {
        match self {
            Self::Production => QBO_PRODUCTION_BASE,
            Self::Sandbox => QBO_SANDBOX_BASE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Sandbox => "sandbox",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Some(Self::Production),
            "sandbox" => Some(Self::Sandbox),
            _ => None,
        }
    }
}

/// Failures reported by the query endpoint itself.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("QuickBooks query failed ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("QuickBooks returned a {kind} fault: {message}")]
    Fault { kind: String, message: String },
}

/// A source of raw query results.
///
/// The paginator only needs one page at a time; implementations decide how
/// the statement reaches the remote system.
#[async_trait]
pub trait QueryApi: Send + Sync {
    /// Run `statement` and return the raw entities listed under `entity`.
    ///
    /// A response without that key is an empty page, not an error.
    async fn query(&self, statement: &str, entity: &str) -> Result<Vec<Value>>;
}

#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    #[serde(rename = "QueryResponse", default)]
    query_response: Option<Map<String, Value>>,
    #[serde(rename = "Fault", default)]
    fault: Option<Fault>,
}

#[derive(Debug, Deserialize)]
struct Fault {
    #[serde(rename = "Error", default)]
    errors: Vec<FaultError>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FaultError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

impl Fault {
    fn into_error(self) -> QueryError {
        let message = self
            .errors
            .iter()
            .map(|e| match (&e.message, &e.detail) {
                (Some(m), Some(d)) => format!("{m} ({d})"),
                (Some(m), None) => m.clone(),
                (None, Some(d)) => d.clone(),
                (None, None) => "unknown error".to_string(),
            })
            .collect::<Vec<_>>()
            .join("; ");

        QueryError::Fault {
            kind: self.kind.unwrap_or_else(|| "unknown".to_string()),
            message,
        }
    }
}

/// Pull the entity list out of a decoded envelope.
fn entities_from_envelope(envelope: QueryEnvelope, entity: &str) -> Result<Vec<Value>> {
    if let Some(fault) = envelope.fault {
        return Err(fault.into_error().into());
    }

    let entities = match envelope
        .query_response
        .and_then(|mut response| response.remove(entity))
    {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    Ok(entities)
}

/// Authenticated client for one company (realm).
pub struct QboClient {
    client: Client,
    base_url: String,
    realm_id: String,
    access_token: SecretString,
}

impl QboClient {
    pub fn new(
        realm_id: impl Into<String>,
        access_token: SecretString,
        environment: QboEnvironment,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: environment.base_url().to_string(),
            realm_id: realm_id.into(),
            access_token,
        }
    }

    /// Override API base URL (useful for tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn query_url(&self) -> String {
        format!(
            "{}/v3/company/{}/query",
            self.base_url.trim_end_matches('/'),
            self.realm_id
        )
    }
}

#[async_trait]
impl QueryApi for QboClient {
    async fn query(&self, statement: &str, entity: &str) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(self.query_url())
            .query(&[("query", statement)])
            .header(
                "Authorization",
                format!("Bearer {}", self.access_token.expose_secret()),
            )
            .header("Accept", "application/json")
            .send()
            .await
            .context("QuickBooks HTTP request failed")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read QuickBooks response body")?;

        if !status.is_success() {
            return Err(QueryError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let envelope: QueryEnvelope =
            serde_json::from_str(&body).context("Failed to parse QuickBooks query response")?;
        entities_from_envelope(envelope, entity)
    }
}
