//! CSV export of retained payments.

mod mail;

pub use mail::{ExportEmail, Mailer, SmtpMailer, SmtpSettings};

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::reconcile::ReconciledPayment;

/// Column order of the export file.
pub const EXPORT_HEADERS: [&str; 15] = [
    "Payment_ID",
    "Date",
    "Total_Amount",
    "QBO_Customer_ID",
    "Customer_Name",
    "Invoice_Number",
    "Payment_Method",
    "Payment_Number",
    "Memo",
    "Deposit_Account_ID",
    "Deposit_Account_Name",
    "Has_Matching_Deposit",
    "Deposit_ID",
    "Deposit_Number",
    "Unprocessed",
];

/// One output row. Field order matches [`EXPORT_HEADERS`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRecord {
    #[serde(rename = "Payment_ID")]
    pub payment_id: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Total_Amount")]
    pub total_amount: String,
    #[serde(rename = "QBO_Customer_ID")]
    pub customer_id: String,
    #[serde(rename = "Customer_Name")]
    pub customer_name: String,
    #[serde(rename = "Invoice_Number")]
    pub invoice_number: String,
    #[serde(rename = "Payment_Method")]
    pub payment_method: String,
    #[serde(rename = "Payment_Number")]
    pub payment_number: Option<String>,
    #[serde(rename = "Memo")]
    pub memo: Option<String>,
    #[serde(rename = "Deposit_Account_ID")]
    pub deposit_account_id: String,
    #[serde(rename = "Deposit_Account_Name")]
    pub deposit_account_name: String,
    #[serde(rename = "Has_Matching_Deposit")]
    pub has_matching_deposit: bool,
    #[serde(rename = "Deposit_ID")]
    pub deposit_id: String,
    #[serde(rename = "Deposit_Number")]
    pub deposit_number: String,
    #[serde(rename = "Unprocessed")]
    pub unprocessed: bool,
}

impl From<&ReconciledPayment> for ExportRecord {
    fn from(p: &ReconciledPayment) -> Self {
        Self {
            payment_id: p.payment_id.clone(),
            date: p.txn_date.clone(),
            total_amount: p.total_amount.clone(),
            customer_id: p.customer_id.clone(),
            customer_name: p.customer_name.clone(),
            invoice_number: p.invoice_number.clone(),
            payment_method: p.payment_method.clone(),
            payment_number: p.payment_ref_num.clone(),
            memo: p.memo.clone(),
            deposit_account_id: p.deposit_account_id.clone(),
            deposit_account_name: p.deposit_account_name.clone(),
            has_matching_deposit: p.has_matching_deposit,
            deposit_id: p.deposit_id.clone(),
            deposit_number: p.deposit_number.clone(),
            unprocessed: p.is_unprocessed,
        }
    }
}

pub fn project(payments: &[ReconciledPayment]) -> Vec<ExportRecord> {
    payments.iter().map(ExportRecord::from).collect()
}

/// Write a header row followed by one row per record.
pub fn write_csv<W: Write>(records: &[ExportRecord], writer: W) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    csv_writer
        .write_record(EXPORT_HEADERS)
        .context("Failed to write CSV header")?;
    for record in records {
        csv_writer
            .serialize(record)
            .with_context(|| format!("Failed to write CSV row for payment {}", record.payment_id))?;
    }
    csv_writer.flush().context("Failed to flush CSV output")?;
    Ok(())
}

pub fn write_csv_file(records: &[ExportRecord], path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create export file: {}", path.display()))?;
    write_csv(records, file)
        .with_context(|| format!("Failed to write export file: {}", path.display()))
}
