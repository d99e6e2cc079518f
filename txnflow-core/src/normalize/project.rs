//! Projection of raw API entries into flat records.
//!
//! Projection never applies defaults other than the two the source format
//! implies: an absent `pending` flag means `false`, and missing nested
//! objects (`personal_finance_category`, `balances`) yield `None` for every
//! field read through them.

use crate::domain::{AccountRecord, ArtifactError, RawArtifact, TransactionRecord};
use serde_json::{Map, Value};

pub fn project_transactions(artifact: &RawArtifact) -> Result<Vec<TransactionRecord>, ArtifactError> {
    Ok(artifact
        .transactions()?
        .into_iter()
        .map(project_transaction)
        .collect())
}

pub fn project_accounts(artifact: &RawArtifact) -> Result<Vec<AccountRecord>, ArtifactError> {
    Ok(artifact
        .accounts()?
        .into_iter()
        .map(project_account)
        .collect())
}

fn project_transaction(txn: &Map<String, Value>) -> TransactionRecord {
    let pfc = txn.get("personal_finance_category").and_then(Value::as_object);

    TransactionRecord {
        transaction_id: text(txn.get("transaction_id")),
        account_id: text(txn.get("account_id")),
        amount: number(txn.get("amount")),
        iso_currency_code: text(txn.get("iso_currency_code")),
        date: text(txn.get("date")),
        transaction_type: text(txn.get("transaction_type")),
        confidence_level: pfc.and_then(|p| text(p.get("confidence_level"))),
        pending: match txn.get("pending") {
            None => Some(false),
            Some(Value::Null) => None,
            Some(v) => Some(truthy(v)),
        },
        category: pfc.and_then(|p| text(p.get("primary"))),
        merchant_name: text(txn.get("name")),
        payment_channel: text(txn.get("payment_channel")),
        website: text(txn.get("website")),
    }
}

fn project_account(acc: &Map<String, Value>) -> AccountRecord {
    let balances = acc.get("balances").and_then(Value::as_object);

    AccountRecord {
        account_id: text(acc.get("account_id")),
        name: text(acc.get("name")),
        official_name: text(acc.get("official_name")),
        account_type: text(acc.get("type")),
        subtype: text(acc.get("subtype")),
        holder_category: text(acc.get("holder_category")),
        current_balance: balances.and_then(|b| number(b.get("current"))),
        available_balance: balances.and_then(|b| number(b.get("available"))),
        iso_currency_code: balances.and_then(|b| text(b.get("iso_currency_code"))),
    }
}

/// String form of a scalar; `None` for null/absent. Nested values keep
/// their JSON text so nothing is silently dropped.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Numeric value; numeric strings are accepted, anything else is `None`.
fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// JSON truthiness: false, 0, "" and empty containers are false.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn artifact(payload: Value) -> RawArtifact {
        RawArtifact::parse("to_process/x.json", payload.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn full_transaction_projection() {
        let a = artifact(json!({
            "transactions": [{
                "transaction_id": "t1",
                "account_id": "a1",
                "amount": 12.5,
                "iso_currency_code": "usd",
                "date": "2024-02-03",
                "transaction_type": "place",
                "personal_finance_category": {"primary": "FOOD_AND_DRINK", "confidence_level": "HIGH"},
                "pending": true,
                "name": " Starbucks ",
                "payment_channel": "in store",
                "website": "starbucks.com"
            }]
        }));

        let rows = project_transactions(&a).unwrap();
        assert_eq!(rows.len(), 1);
        let t = &rows[0];
        assert_eq!(t.transaction_id.as_deref(), Some("t1"));
        assert_eq!(t.amount, Some(12.5));
        assert_eq!(t.category.as_deref(), Some("FOOD_AND_DRINK"));
        assert_eq!(t.confidence_level.as_deref(), Some("HIGH"));
        assert_eq!(t.merchant_name.as_deref(), Some(" Starbucks "));
        assert_eq!(t.pending, Some(true));
        assert_eq!(t.website.as_deref(), Some("starbucks.com"));
    }

    #[test]
    fn missing_category_object_yields_none() {
        let a = artifact(json!({"transactions": [{"transaction_id": "t1"}]}));
        let t = &project_transactions(&a).unwrap()[0];
        assert_eq!(t.category, None);
        assert_eq!(t.confidence_level, None);
    }

    #[test]
    fn absent_pending_defaults_false_but_null_stays_none() {
        let a = artifact(json!({"transactions": [
            {"transaction_id": "t1"},
            {"transaction_id": "t2", "pending": null},
            {"transaction_id": "t3", "pending": 1},
        ]}));
        let rows = project_transactions(&a).unwrap();
        assert_eq!(rows[0].pending, Some(false));
        assert_eq!(rows[1].pending, None);
        assert_eq!(rows[2].pending, Some(true));
    }

    #[test]
    fn account_balances_projection() {
        let a = artifact(json!({"accounts": [
            {"account_id": "a1", "type": "depository",
             "balances": {"current": 110.0, "available": "100.5", "iso_currency_code": "USD"}},
            {"account_id": "a2"},
            {"account_id": "a3", "balances": null},
        ]}));
        let rows = project_accounts(&a).unwrap();
        assert_eq!(rows[0].current_balance, Some(110.0));
        assert_eq!(rows[0].available_balance, Some(100.5));
        assert_eq!(rows[0].iso_currency_code.as_deref(), Some("USD"));
        assert_eq!(rows[0].account_type.as_deref(), Some("depository"));
        assert_eq!(rows[1].current_balance, None);
        assert_eq!(rows[2].iso_currency_code, None);
    }

    #[test]
    fn truthiness() {
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!("false")));
        assert!(!truthy(&json!([])));
        assert!(truthy(&json!({"a": 1})));
    }
}
