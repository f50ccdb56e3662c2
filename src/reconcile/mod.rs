//! Payment reconciliation.
//!
//! Payments are joined against lookups built from payment methods, accounts,
//! and deposits, then filtered down to the ones that still need attention.
//! Missing or malformed data never fails a run here; it resolves to empty
//! strings or `false`.

mod engine;
mod index;

pub use engine::{
    first_invoice_number, is_exportable_method, is_recent, is_unprocessed, reconcile,
    reconcile_payment, Exclusion, ExclusionCounts, ReconciledPayment, Reconciliation,
    EXPORTABLE_METHODS, RECENT_WINDOW_DAYS,
};
pub use index::{
    account_index, deposit_index, payment_method_index, ContestedPayment, DepositLink,
    IndexDiagnostics, ReferenceIndex,
};
