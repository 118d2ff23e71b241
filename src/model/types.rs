//! Normalized transaction entity structs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted ledger transaction.
///
/// Sign convention: negative `amount` is an expense, positive is income.
/// `merchant_name` is always non-empty and trimmed; the optional text fields
/// are either absent or non-empty (never `Some("")`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub merchant_name: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub currency: String,
    pub location: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
}

/// Input for creating a transaction. Unset fields pick up defaults at
/// normalization time (timestamp = now, currency = configured default).
#[derive(Debug, Clone, Default)]
pub struct NewTransaction {
    pub merchant_name: String,
    pub amount: f64,
    pub timestamp: Option<DateTime<Utc>>,
    pub currency: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
}

/// Field-level update for an existing transaction. `None` leaves the field
/// untouched; for the optional text fields, `Some(s)` where `s` trims to
/// empty clears the field.
#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub merchant_name: Option<String>,
    pub amount: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub currency: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
}

/// Trim an optional text field, collapsing a trimmed-empty value to `None`.
pub fn trim_optional(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl NewTransaction {
    /// Apply trimming and defaults, producing the record that will be stored
    /// and indexed. Returns `None` when the merchant name trims to empty.
    pub fn normalize(self, default_currency: &str) -> Option<TransactionRecord> {
        let merchant_name = self.merchant_name.trim().to_string();
        if merchant_name.is_empty() {
            return None;
        }
        Some(TransactionRecord {
            id: Uuid::new_v4(),
            merchant_name,
            amount: self.amount,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            currency: self
                .currency
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| default_currency.to_string()),
            location: trim_optional(self.location),
            category: trim_optional(self.category),
            description: trim_optional(self.description),
        })
    }
}

impl TransactionPatch {
    /// Apply the patch to a record, trimming incoming text. A merchant name
    /// that trims to empty is rejected by returning `None`.
    pub fn apply(self, record: &TransactionRecord) -> Option<TransactionRecord> {
        let mut updated = record.clone();
        if let Some(name) = self.merchant_name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return None;
            }
            updated.merchant_name = name;
        }
        if let Some(amount) = self.amount {
            updated.amount = amount;
        }
        if let Some(ts) = self.timestamp {
            updated.timestamp = ts;
        }
        if let Some(currency) = self.currency {
            let currency = currency.trim().to_string();
            if !currency.is_empty() {
                updated.currency = currency;
            }
        }
        if let Some(location) = self.location {
            updated.location = trim_optional(Some(location));
        }
        if let Some(category) = self.category {
            updated.category = trim_optional(Some(category));
        }
        if let Some(description) = self.description {
            updated.description = trim_optional(Some(description));
        }
        Some(updated)
    }
}
