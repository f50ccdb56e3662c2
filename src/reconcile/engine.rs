use chrono::{Days, NaiveDate};
use serde_json::Value;

use super::index::ReferenceIndex;
use crate::clock::Clock;
use crate::qbo::models::{Payment, TXN_TYPE_INVOICE};

/// Method names eligible for export. Matched exactly.
pub const EXPORTABLE_METHODS: [&str; 2] = ["Credit Card", "ACH"];

/// How far back a payment may be dated and still count as recent.
pub const RECENT_WINDOW_DAYS: u64 = 30;

const TXN_DATE_FORMAT: &str = "%Y-%m-%d";

/// Why a payment was left out of the export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    Processed,
    Method,
    Stale,
}

/// A payment joined against the reference index, with every derived field.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledPayment {
    pub payment_id: String,
    pub txn_date: String,
    pub total_amount: String,
    pub customer_id: String,
    pub customer_name: String,
    pub invoice_number: String,
    pub payment_method: String,
    pub payment_ref_num: Option<String>,
    pub memo: Option<String>,
    pub deposit_account_id: String,
    pub deposit_account_name: String,
    pub has_matching_deposit: bool,
    pub deposit_id: String,
    pub deposit_number: String,
    pub is_unprocessed: bool,
    pub is_valid_method: bool,
    pub is_recent: bool,
}

impl ReconciledPayment {
    /// First failing predicate, checked processed -> method -> stale.
    pub fn exclusion(&self) -> Option<Exclusion> {
        if !self.is_unprocessed {
            Some(Exclusion::Processed)
        } else if !self.is_valid_method {
            Some(Exclusion::Method)
        } else if !self.is_recent {
            Some(Exclusion::Stale)
        } else {
            None
        }
    }

    pub fn is_retained(&self) -> bool {
        self.exclusion().is_none()
    }
}

/// Counts of payments dropped, by first failing predicate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExclusionCounts {
    pub processed: usize,
    pub method: usize,
    pub stale: usize,
}

impl ExclusionCounts {
    fn record(&mut self, reason: Exclusion) {
        match reason {
            Exclusion::Processed => self.processed += 1,
            Exclusion::Method => self.method += 1,
            Exclusion::Stale => self.stale += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.processed + self.method + self.stale
    }
}

/// Result of reconciling a payment snapshot.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Retained payments, in fetch order.
    pub records: Vec<ReconciledPayment>,
    pub examined: usize,
    pub excluded: ExclusionCounts,
}

/// Only a JSON `true` marks a payment as processed.
pub fn is_unprocessed(process_payment: Option<&Value>) -> bool {
    !matches!(process_payment, Some(Value::Bool(true)))
}

pub fn is_exportable_method(method_name: &str) -> bool {
    EXPORTABLE_METHODS.contains(&method_name)
}

/// Whether `txn_date` falls on or after `today - RECENT_WINDOW_DAYS`.
///
/// A missing or unparsable date is never recent.
pub fn is_recent(txn_date: Option<&str>, today: NaiveDate) -> bool {
    let Some(date) = txn_date.and_then(|raw| NaiveDate::parse_from_str(raw, TXN_DATE_FORMAT).ok())
    else {
        return false;
    };
    let cutoff = today
        .checked_sub_days(Days::new(RECENT_WINDOW_DAYS))
        .unwrap_or(NaiveDate::MIN);
    date >= cutoff
}

/// ID of the first invoice linked from any line, scanning lines in order.
pub fn first_invoice_number(payment: &Payment) -> String {
    payment
        .line
        .iter()
        .flat_map(|line| line.linked_txn.iter())
        .find(|txn| txn.is_type(TXN_TYPE_INVOICE))
        .and_then(|txn| txn.txn_id.clone())
        .unwrap_or_default()
}

/// Join one payment against the index and derive every field.
pub fn reconcile_payment(
    payment: &Payment,
    index: &ReferenceIndex,
    today: NaiveDate,
) -> ReconciledPayment {
    let payment_id = payment.id().to_string();
    let payment_method = index
        .payment_method_name(payment.payment_method_ref.value.as_deref())
        .to_string();

    let deposit_account_id = payment
        .deposit_to_account_ref
        .value
        .clone()
        .unwrap_or_default();
    let deposit_account_name = index
        .account_name(payment.deposit_to_account_ref.value.as_deref())
        .to_string();

    let deposit = index.deposit_for(&payment_id);

    ReconciledPayment {
        txn_date: payment.txn_date.clone().unwrap_or_default(),
        total_amount: payment.total_amount_text(),
        customer_id: payment.customer_ref.value.clone().unwrap_or_default(),
        customer_name: payment.customer_ref.name.clone().unwrap_or_default(),
        invoice_number: first_invoice_number(payment),
        is_valid_method: is_exportable_method(&payment_method),
        payment_method,
        payment_ref_num: payment.payment_ref_num.clone(),
        memo: payment.private_note.clone(),
        deposit_account_id,
        deposit_account_name,
        has_matching_deposit: deposit.is_some(),
        deposit_id: deposit.map(|d| d.deposit_id.clone()).unwrap_or_default(),
        deposit_number: deposit
            .map(|d| d.deposit_number.clone())
            .unwrap_or_default(),
        is_unprocessed: is_unprocessed(payment.process_payment.as_ref()),
        is_recent: is_recent(payment.txn_date.as_deref(), today),
        payment_id,
    }
}

/// Reconcile every payment and keep those that are unprocessed, paid by an
/// exportable method, and recent. Order follows `payments`.
pub fn reconcile(payments: &[Payment], index: &ReferenceIndex, clock: &dyn Clock) -> Reconciliation {
    let today = clock.today();
    let mut result = Reconciliation {
        examined: payments.len(),
        ..Reconciliation::default()
    };

    for payment in payments {
        let reconciled = reconcile_payment(payment, index, today);
        match reconciled.exclusion() {
            None => result.records.push(reconciled),
            Some(reason) => result.excluded.record(reason),
        }
    }

    result
}
