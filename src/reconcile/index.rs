//! Lookup tables built from the reference collections.
//!
//! All three tables are last-write-wins on duplicate keys. Each overwrite is
//! recorded in [`IndexDiagnostics`] so callers can report it.

use std::collections::HashMap;

use crate::qbo::models::{Account, Deposit, PaymentMethod};

/// The deposit that swept a given payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositLink {
    pub deposit_id: String,
    pub deposit_number: String,
}

/// A payment linked from more than one deposit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContestedPayment {
    pub payment_id: String,
    pub replaced_deposit_id: String,
    pub deposit_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDiagnostics {
    pub duplicate_payment_methods: Vec<String>,
    pub duplicate_accounts: Vec<String>,
    pub contested_payments: Vec<ContestedPayment>,
}

impl IndexDiagnostics {
    pub fn is_clean(&self) -> bool {
        self.duplicate_payment_methods.is_empty()
            && self.duplicate_accounts.is_empty()
            && self.contested_payments.is_empty()
    }
}

/// Payment method ID -> method name.
pub fn payment_method_index(
    methods: &[PaymentMethod],
    diagnostics: &mut IndexDiagnostics,
) -> HashMap<String, String> {
    let mut index = HashMap::with_capacity(methods.len());
    for method in methods {
        let Some(id) = method.id.as_deref() else {
            continue;
        };
        let name = method.name.clone().unwrap_or_default();
        if index.insert(id.to_string(), name).is_some() {
            diagnostics.duplicate_payment_methods.push(id.to_string());
        }
    }
    index
}

/// Account ID -> display name.
pub fn account_index(
    accounts: &[Account],
    diagnostics: &mut IndexDiagnostics,
) -> HashMap<String, String> {
    let mut index = HashMap::with_capacity(accounts.len());
    for account in accounts {
        let Some(id) = account.id.as_deref() else {
            continue;
        };
        if index
            .insert(id.to_string(), account.display_name().to_string())
            .is_some()
        {
            diagnostics.duplicate_accounts.push(id.to_string());
        }
    }
    index
}

/// Payment ID -> the deposit that references it.
///
/// Deposits are scanned in fetch order, so a later deposit replaces an
/// earlier one for the same payment.
pub fn deposit_index(
    deposits: &[Deposit],
    diagnostics: &mut IndexDiagnostics,
) -> HashMap<String, DepositLink> {
    let mut index: HashMap<String, DepositLink> = HashMap::new();
    for deposit in deposits {
        let deposit_id = deposit.id.clone().unwrap_or_default();
        let deposit_number = deposit.doc_number.clone().unwrap_or_default();

        for payment_id in deposit.linked_payment_ids() {
            let link = DepositLink {
                deposit_id: deposit_id.clone(),
                deposit_number: deposit_number.clone(),
            };
            if let Some(previous) = index.insert(payment_id.to_string(), link) {
                diagnostics.contested_payments.push(ContestedPayment {
                    payment_id: payment_id.to_string(),
                    replaced_deposit_id: previous.deposit_id,
                    deposit_id: deposit_id.clone(),
                });
            }
        }
    }
    index
}

/// Read-only lookups used while reconciling payments.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    payment_methods: HashMap<String, String>,
    accounts: HashMap<String, String>,
    deposits: HashMap<String, DepositLink>,
    diagnostics: IndexDiagnostics,
}

impl ReferenceIndex {
    pub fn build(methods: &[PaymentMethod], accounts: &[Account], deposits: &[Deposit]) -> Self {
        let mut diagnostics = IndexDiagnostics::default();
        let payment_methods = payment_method_index(methods, &mut diagnostics);
        let accounts = account_index(accounts, &mut diagnostics);
        let deposits = deposit_index(deposits, &mut diagnostics);

        Self {
            payment_methods,
            accounts,
            deposits,
            diagnostics,
        }
    }

    /// Method name for `id`, or `""` when unknown or absent.
    pub fn payment_method_name(&self, id: Option<&str>) -> &str {
        id.and_then(|id| self.payment_methods.get(id))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Account display name for `id`, or `""` when unknown or absent.
    pub fn account_name(&self, id: Option<&str>) -> &str {
        id.and_then(|id| self.accounts.get(id))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn deposit_for(&self, payment_id: &str) -> Option<&DepositLink> {
        self.deposits.get(payment_id)
    }

    pub fn deposit_link_count(&self) -> usize {
        self.deposits.len()
    }

    pub fn diagnostics(&self) -> &IndexDiagnostics {
        &self.diagnostics
    }
}
