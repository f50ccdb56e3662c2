//! Command implementations.
//!
//! Everything runs sequentially: each remote call finishes before the next
//! one starts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use secrecy::SecretString;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::export::{self, ExportEmail, ExportRecord, Mailer, SmtpMailer};
use crate::oauth::{persist_rotated_token, IntuitTokenClient, TokenRefresher};
use crate::qbo::models::{Account, Deposit, Payment, PaymentMethod};
use crate::qbo::{fetch_all, EntityQuery, QboClient, QueryApi, DEFAULT_PAGE_SIZE};
use crate::reconcile::{reconcile, ExclusionCounts, IndexDiagnostics, ReferenceIndex};

pub const DEFAULT_OUTPUT: &str = "credit_list.csv";

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output: PathBuf,
    pub page_size: usize,
    /// Refresh the access token before querying.
    pub refresh: bool,
    /// Email the export after writing it.
    pub email: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_OUTPUT),
            page_size: DEFAULT_PAGE_SIZE,
            refresh: false,
            email: false,
        }
    }
}

/// The four collections the reconciliation needs.
#[derive(Debug, Clone, Default)]
pub struct FetchedData {
    pub payment_methods: Vec<PaymentMethod>,
    pub accounts: Vec<Account>,
    pub deposits: Vec<Deposit>,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionCounts {
    pub payment_methods: usize,
    pub accounts: usize,
    pub deposits: usize,
    pub payments: usize,
}

impl FetchedData {
    pub fn counts(&self) -> CollectionCounts {
        CollectionCounts {
            payment_methods: self.payment_methods.len(),
            accounts: self.accounts.len(),
            deposits: self.deposits.len(),
            payments: self.payments.len(),
        }
    }
}

/// Fetch payment methods, accounts, deposits, then payments, one at a time.
pub async fn fetch_collections(api: &dyn QueryApi, page_size: usize) -> Result<FetchedData> {
    let payment_methods = fetch_all(api, &EntityQuery::all("PaymentMethod"), page_size).await?;
    let accounts = fetch_all(api, &EntityQuery::all("Account"), page_size).await?;
    let deposits = fetch_all(api, &EntityQuery::all("Deposit"), page_size).await?;
    let payments = fetch_all(api, &EntityQuery::all("Payment"), page_size).await?;

    Ok(FetchedData {
        payment_methods,
        accounts,
        deposits,
        payments,
    })
}

fn log_diagnostics(diagnostics: &IndexDiagnostics) {
    for id in &diagnostics.duplicate_payment_methods {
        warn!(payment_method_id = %id, "Duplicate payment method id; keeping the last one");
    }
    for id in &diagnostics.duplicate_accounts {
        warn!(account_id = %id, "Duplicate account id; keeping the last one");
    }
    for contested in &diagnostics.contested_payments {
        warn!(
            payment_id = %contested.payment_id,
            replaced_deposit_id = %contested.replaced_deposit_id,
            deposit_id = %contested.deposit_id,
            "Payment linked from more than one deposit; keeping the later deposit"
        );
    }
}

/// Result of fetching, reconciling, and (if anything was retained) writing
/// the export file.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub fetched: CollectionCounts,
    pub records: Vec<ExportRecord>,
    pub excluded: ExclusionCounts,
    /// Where the file was written; `None` when no payment was retained.
    pub written: Option<PathBuf>,
}

pub async fn export_with(
    api: &dyn QueryApi,
    clock: &dyn Clock,
    options: &ExportOptions,
) -> Result<ExportOutcome> {
    let data = fetch_collections(api, options.page_size).await?;

    let index = ReferenceIndex::build(&data.payment_methods, &data.accounts, &data.deposits);
    log_diagnostics(index.diagnostics());
    info!(
        deposit_links = index.deposit_link_count(),
        "Built reference index"
    );

    let reconciliation = reconcile(&data.payments, &index, clock);
    info!(
        examined = reconciliation.examined,
        retained = reconciliation.records.len(),
        processed = reconciliation.excluded.processed,
        other_method = reconciliation.excluded.method,
        stale = reconciliation.excluded.stale,
        "Reconciled payments"
    );

    let records = export::project(&reconciliation.records);
    let written = if records.is_empty() {
        None
    } else {
        export::write_csv_file(&records, &options.output)?;
        Some(options.output.clone())
    };

    Ok(ExportOutcome {
        fetched: data.counts(),
        records,
        excluded: reconciliation.excluded,
        written,
    })
}

/// Email the export. Delivery problems are logged and reported as `false`.
pub async fn deliver_export(
    mailer: &dyn Mailer,
    to: &str,
    path: &Path,
    record_count: usize,
    date: NaiveDate,
) -> bool {
    let result = match ExportEmail::for_export(to, path, record_count, date) {
        Ok(email) => mailer.send(&email).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(()) => {
            info!(to, "Emailed export");
            true
        }
        Err(err) => {
            warn!(to, error = %format!("{err:#}"), "Failed to email export");
            false
        }
    }
}

#[derive(Debug)]
pub struct RefreshOutcome {
    pub access_token: SecretString,
    pub rotated: bool,
    pub persisted: bool,
}

pub async fn refresh_with(
    refresher: &dyn TokenRefresher,
    store: Option<&dyn CredentialStore>,
    secret_name: &str,
    refresh_token: &SecretString,
) -> Result<RefreshOutcome> {
    let tokens = refresher.refresh(refresh_token).await?;
    let rotated = tokens.rotated_refresh_token().is_some();
    info!(rotated, expires_in = ?tokens.expires_in, "Refreshed access token");

    let persisted = persist_rotated_token(store, secret_name, &tokens).await;
    Ok(RefreshOutcome {
        access_token: tokens.access_token,
        rotated,
        persisted,
    })
}

fn token_client(config: &Config) -> Result<IntuitTokenClient> {
    let (client_id, client_secret) = config.require_client_credentials()?;
    let mut client = IntuitTokenClient::new(client_id, client_secret);
    if let Some(url) = config.oauth_token_url() {
        client = client.with_token_url(url);
    }
    Ok(client)
}

/// Refresh the access token and save a rotated refresh token.
pub async fn refresh_access_token(config: &Config) -> Result<RefreshOutcome> {
    let refresh_token = config.require_refresh_token()?;
    let client = token_client(config)?;
    let store = config.secret_store();

    refresh_with(
        &client,
        store.as_deref(),
        config.refresh_token_secret_name(),
        &refresh_token,
    )
    .await
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub fetched: CollectionCounts,
    pub retained: usize,
    pub excluded: ExclusionCounts,
    pub output: Option<PathBuf>,
    pub emailed: bool,
    pub token_rotated: bool,
    pub token_persisted: bool,
}

/// The full export run: optional refresh, fetch, reconcile, write, email.
///
/// Configuration for every requested step is checked before the first
/// network call.
pub async fn run_export(
    config: &Config,
    options: &ExportOptions,
    clock: &dyn Clock,
) -> Result<RunSummary> {
    let realm_id = config.require_realm_id()?;
    let environment = config.environment()?;
    let delivery = if options.email {
        Some((config.require_smtp()?, config.require_email_to()?))
    } else {
        None
    };

    let (access_token, token_rotated, token_persisted) = if options.refresh {
        let refreshed = refresh_access_token(config)
            .await
            .context("Could not refresh the access token")?;
        (refreshed.access_token, refreshed.rotated, refreshed.persisted)
    } else {
        (config.require_access_token()?, false, false)
    };

    let mut client = QboClient::new(realm_id, access_token, environment);
    if let Some(base_url) = config.qbo_base_url() {
        client = client.with_base_url(base_url);
    }

    let outcome = export_with(&client, clock, options).await?;

    let emailed = match (&delivery, &outcome.written) {
        (Some((smtp, to)), Some(path)) => {
            let mailer = SmtpMailer::new(smtp.clone());
            deliver_export(&mailer, to, path, outcome.records.len(), clock.today()).await
        }
        (Some(_), None) => {
            info!("No records retained; skipping email");
            false
        }
        _ => false,
    };

    Ok(RunSummary {
        fetched: outcome.fetched,
        retained: outcome.records.len(),
        excluded: outcome.excluded,
        output: outcome.written,
        emailed,
        token_rotated,
        token_persisted,
    })
}
