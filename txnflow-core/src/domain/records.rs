//! Tabular records derived from a raw artifact.
//!
//! Field order here is the column order of the CSV outputs. Optional fields
//! are `None` straight out of projection and filled in by cleaning.

use serde::{Deserialize, Serialize};

/// Column names for a record type, in serialization order.
pub trait CsvRecord: Serialize {
    const COLUMNS: &'static [&'static str];
}

/// One transaction row. Unique by `transaction_id` within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: Option<String>,
    pub account_id: Option<String>,
    pub amount: Option<f64>,
    pub iso_currency_code: Option<String>,
    /// `YYYY-MM-DD` once cleaned; the raw string before.
    pub date: Option<String>,
    pub transaction_type: Option<String>,
    pub confidence_level: Option<String>,
    pub pending: Option<bool>,
    pub category: Option<String>,
    pub merchant_name: Option<String>,
    pub payment_channel: Option<String>,
    pub website: Option<String>,
}

impl CsvRecord for TransactionRecord {
    const COLUMNS: &'static [&'static str] = &[
        "transaction_id",
        "account_id",
        "amount",
        "iso_currency_code",
        "date",
        "transaction_type",
        "confidence_level",
        "pending",
        "category",
        "merchant_name",
        "payment_channel",
        "website",
    ];
}

/// One account row. Unique by `account_id` within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account_id: Option<String>,
    pub name: Option<String>,
    pub official_name: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    pub subtype: Option<String>,
    pub holder_category: Option<String>,
    pub current_balance: Option<f64>,
    pub available_balance: Option<f64>,
    pub iso_currency_code: Option<String>,
}

impl CsvRecord for AccountRecord {
    const COLUMNS: &'static [&'static str] = &[
        "account_id",
        "name",
        "official_name",
        "type",
        "subtype",
        "holder_category",
        "current_balance",
        "available_balance",
        "iso_currency_code",
    ];
}
