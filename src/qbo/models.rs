//! Entity shapes returned by the QuickBooks Online query API.
//!
//! Only the fields the export needs are modelled. Every field decodes
//! leniently: a missing, `null` or oddly typed value falls back to its
//! default, so the only entity that fails to decode is one that is not a JSON
//! object at all.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Transaction type tag for a payment referenced from a deposit line.
pub const TXN_TYPE_PAYMENT: &str = "Payment";
/// Transaction type tag for an invoice referenced from a payment line.
pub const TXN_TYPE_INVOICE: &str = "Invoice";

/// Scalar as text. Numbers and booleans are stringified; `null`, arrays and
/// objects read as absent.
fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// Nested object, or its default when the value has some other shape.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Array whose malformed elements are dropped. A non-array reads as empty.
fn items<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(values) => values
            .into_iter()
            .filter_map(|value| T::deserialize(value).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// Reference to another entity (`{"value": "42", "name": "Acme"}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EntityRef {
    #[serde(default, deserialize_with = "text")]
    pub value: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LinkedTxn {
    #[serde(default, deserialize_with = "text")]
    pub txn_id: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub txn_type: Option<String>,
}

impl LinkedTxn {
    pub fn is_type(&self, txn_type: &str) -> bool {
        self.txn_type.as_deref() == Some(txn_type)
    }
}

/// A document line. Only its linked transactions matter here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Line {
    #[serde(default, deserialize_with = "items")]
    pub linked_txn: Vec<LinkedTxn>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PaymentMethod {
    #[serde(default, deserialize_with = "text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Account {
    #[serde(default, deserialize_with = "text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub fully_qualified_name: Option<String>,
}

impl Account {
    /// `Name`, falling back to `FullyQualifiedName` only when `Name` is absent.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.fully_qualified_name.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Deposit {
    #[serde(default, deserialize_with = "text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub doc_number: Option<String>,
    #[serde(default, deserialize_with = "items")]
    pub line: Vec<Line>,
}

impl Deposit {
    /// IDs of every payment swept into this deposit, in line order.
    pub fn linked_payment_ids(&self) -> impl Iterator<Item = &str> {
        self.line
            .iter()
            .flat_map(|line| line.linked_txn.iter())
            .filter(|txn| txn.is_type(TXN_TYPE_PAYMENT))
            .filter_map(|txn| txn.txn_id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Payment {
    #[serde(default, deserialize_with = "text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub txn_date: Option<String>,
    /// Kept as raw JSON so the export reproduces the amount as sent.
    #[serde(default)]
    pub total_amt: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub customer_ref: EntityRef,
    #[serde(default, deserialize_with = "lenient")]
    pub payment_method_ref: EntityRef,
    #[serde(default, deserialize_with = "lenient")]
    pub deposit_to_account_ref: EntityRef,
    /// Anything other than a JSON `true` means the payment is unprocessed.
    #[serde(default)]
    pub process_payment: Option<Value>,
    #[serde(default, deserialize_with = "text")]
    pub payment_ref_num: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub private_note: Option<String>,
    #[serde(default, deserialize_with = "items")]
    pub line: Vec<Line>,
}

impl Payment {
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }

    /// `TotalAmt` rendered the way the API sent it.
    pub fn total_amount_text(&self) -> String {
        match &self.total_amt {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}
