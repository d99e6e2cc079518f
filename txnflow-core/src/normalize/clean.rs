//! Column cleaning rules.
//!
//! Every rule maps its own output to itself, so cleaning an already cleaned
//! record is a no-op.

use crate::domain::{AccountRecord, TransactionRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

pub const UNCATEGORIZED: &str = "Uncategorized";
pub const UNKNOWN: &str = "Unknown";
pub const UNKNOWN_ACCOUNT: &str = "Unknown Account";
pub const UNKNOWN_CURRENCY: &str = "UNKNOWN";

pub fn clean_transaction(mut t: TransactionRecord) -> TransactionRecord {
    t.date = t.date.as_deref().and_then(parse_date).map(|d| d.format("%Y-%m-%d").to_string());
    t.category = Some(title_case(t.category.as_deref().unwrap_or(UNCATEGORIZED)));
    t.merchant_name = Some(t.merchant_name.as_deref().unwrap_or(UNKNOWN).trim().to_string());
    t.payment_channel = Some(title_case(t.payment_channel.as_deref().unwrap_or(UNKNOWN)));
    t.transaction_type = Some(title_case(t.transaction_type.as_deref().unwrap_or(UNKNOWN)));
    t.iso_currency_code = Some(
        t.iso_currency_code
            .as_deref()
            .unwrap_or(UNKNOWN_CURRENCY)
            .to_uppercase(),
    );
    t.pending = Some(t.pending.unwrap_or(false));
    t
}

pub fn clean_account(mut a: AccountRecord) -> AccountRecord {
    a.name = Some(a.name.as_deref().unwrap_or(UNKNOWN_ACCOUNT).trim().to_string());
    a.official_name = Some(
        a.official_name
            .as_deref()
            .unwrap_or(UNKNOWN_ACCOUNT)
            .trim()
            .to_string(),
    );
    a.account_type = Some(title_case(a.account_type.as_deref().unwrap_or(UNKNOWN)));
    a.subtype = Some(title_case(a.subtype.as_deref().unwrap_or(UNKNOWN)));
    a.holder_category = Some(title_case(a.holder_category.as_deref().unwrap_or(UNKNOWN)));
    a.current_balance = Some(a.current_balance.unwrap_or(0.0));
    a.available_balance = Some(a.available_balance.unwrap_or(0.0));
    a.iso_currency_code = Some(
        a.iso_currency_code
            .as_deref()
            .unwrap_or(UNKNOWN_CURRENCY)
            .to_uppercase(),
    );
    a
}

/// Upper-case the first letter of every run of letters, lower-case the rest.
///
/// Any non-letter starts a new word: `FOOD_AND_DRINK` → `Food_And_Drink`,
/// `in store` → `In Store`, `3rd party` → `3Rd Party`. A word-initial letter
/// whose upper case is several characters keeps only the first one upper:
/// `ßeta` → `Sseta`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                let mut upper = c.to_uppercase();
                out.extend(upper.next());
                out.extend(upper.flat_map(char::to_lowercase));
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// Lenient date parsing. Accepts plain dates and date-times (the time part
/// is dropped); anything else is `None`.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.date())
}
