//! Raw artifact → cleaned, deduplicated record sets.
//!
//! Pipeline per artifact: project → clean → dedup → CSV.

pub mod clean;
pub mod dedup;
pub mod export;
pub mod project;

pub use clean::{clean_account, clean_transaction, parse_date, title_case};
pub use dedup::dedup_by_key;
pub use export::{to_csv, ExportError};
pub use project::{project_accounts, project_transactions};

use crate::domain::{AccountRecord, ArtifactError, RawArtifact, TransactionRecord};

/// Cleaned, deduplicated records from one raw artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedBatch {
    pub transactions: Vec<TransactionRecord>,
    pub accounts: Vec<AccountRecord>,
}

impl TransformedBatch {
    pub fn transactions_csv(&self) -> Result<String, ExportError> {
        to_csv(&self.transactions)
    }

    pub fn accounts_csv(&self) -> Result<String, ExportError> {
        to_csv(&self.accounts)
    }
}

/// Run the full normalization pipeline over one artifact.
pub fn normalize(artifact: &RawArtifact) -> Result<TransformedBatch, ArtifactError> {
    let transactions = project_transactions(artifact)?
        .into_iter()
        .map(clean_transaction)
        .collect();
    let accounts = project_accounts(artifact)?
        .into_iter()
        .map(clean_account)
        .collect();

    Ok(TransformedBatch {
        transactions: dedup_by_key(transactions, |t: &TransactionRecord| t.transaction_id.clone()),
        accounts: dedup_by_key(accounts, |a: &AccountRecord| a.account_id.clone()),
    })
}
