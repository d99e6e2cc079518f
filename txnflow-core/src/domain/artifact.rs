//! Raw extract artifacts and the blob layout shared by both jobs.
//!
//! Layout inside the raw container:
//! - `to_process/plaid_raw_{tag}.json`: written by the extractor, pending
//! - `processed/plaid_raw_{tag}.json`: archived after a successful transform
//! - `claims/plaid_raw_{tag}.json.lease`: transient ownership marker
//!
//! Layout inside the output container:
//! - `transactions_data/transactions_transformed_{tag}.csv`
//! - `accounts_data/accounts_transformed_{tag}.csv`

use super::window::ReportingWindow;
use serde_json::{Map, Value};
use thiserror::Error;

pub const PENDING_PREFIX: &str = "to_process/";
pub const PROCESSED_PREFIX: &str = "processed/";
pub const CLAIMS_PREFIX: &str = "claims/";

const RAW_FILE_PREFIX: &str = "plaid_raw_";
const RAW_FILE_SUFFIX: &str = ".json";
const LEASE_SUFFIX: &str = ".lease";

/// File name of the raw artifact for a window: `plaid_raw_{tag}.json`.
pub fn raw_file_name(window: &ReportingWindow) -> String {
    format!("{RAW_FILE_PREFIX}{}{RAW_FILE_SUFFIX}", window.tag())
}

/// Pending path of the raw artifact for a window.
pub fn pending_path(window: &ReportingWindow) -> String {
    format!("{PENDING_PREFIX}{}", raw_file_name(window))
}

/// Whether a listed blob name is a pending raw artifact.
pub fn is_pending_artifact(name: &str) -> bool {
    name.starts_with(PENDING_PREFIX) && name.ends_with(RAW_FILE_SUFFIX)
}

/// Last path segment of a blob name.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Archive destination for a pending blob: same file name, `processed/` prefix.
pub fn processed_path(pending: &str) -> String {
    match pending.strip_prefix(PENDING_PREFIX) {
        Some(rest) => format!("{PROCESSED_PREFIX}{rest}"),
        None => format!("{PROCESSED_PREFIX}{}", file_name(pending)),
    }
}

/// Lease marker path for a pending blob.
pub fn lease_path(pending: &str) -> String {
    format!("{CLAIMS_PREFIX}{}{LEASE_SUFFIX}", file_name(pending))
}

/// Recover the window embedded in a raw artifact's file name, if it follows
/// the `plaid_raw_{tag}.json` convention.
pub fn window_from_path(path: &str) -> Option<ReportingWindow> {
    let tag = file_name(path)
        .strip_prefix(RAW_FILE_PREFIX)?
        .strip_suffix(RAW_FILE_SUFFIX)?;
    ReportingWindow::parse_tag(tag)
}

pub fn transactions_output_path(window: &ReportingWindow) -> String {
    format!(
        "transactions_data/transactions_transformed_{}.csv",
        window.tag()
    )
}

pub fn accounts_output_path(window: &ReportingWindow) -> String {
    format!("accounts_data/accounts_transformed_{}.csv", window.tag())
}

/// A raw artifact that failed to parse into the expected shape.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("malformed artifact {path}: {reason}")]
    Malformed { path: String, reason: String },
}

impl ArtifactError {
    pub fn malformed(path: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// A downloaded and parsed raw artifact.
///
/// The payload is kept verbatim; projection into records happens in
/// [`crate::normalize`].
#[derive(Debug, Clone)]
pub struct RawArtifact {
    pub path: String,
    pub payload: Value,
}

impl RawArtifact {
    /// Parse blob bytes into an artifact.
    ///
    /// The document must be a JSON object. `transactions` and `accounts`
    /// may be absent, but if present they must be arrays.
    pub fn parse(path: &str, bytes: &[u8]) -> Result<Self, ArtifactError> {
        let payload: Value = serde_json::from_slice(bytes)
            .map_err(|e| ArtifactError::malformed(path, format!("invalid JSON: {e}")))?;

        let object = payload
            .as_object()
            .ok_or_else(|| ArtifactError::malformed(path, "top-level value is not an object"))?;

        for key in ["transactions", "accounts"] {
            match object.get(key) {
                None | Some(Value::Array(_)) => {}
                Some(other) => {
                    return Err(ArtifactError::malformed(
                        path,
                        format!("`{key}` is {}, expected an array", kind_of(other)),
                    ))
                }
            }
        }

        Ok(Self {
            path: path.to_string(),
            payload,
        })
    }

    /// Window encoded in the artifact's file name, if any.
    pub fn window(&self) -> Option<ReportingWindow> {
        window_from_path(&self.path)
    }

    /// Entries of `transactions[]`, each required to be an object.
    pub fn transactions(&self) -> Result<Vec<&Map<String, Value>>, ArtifactError> {
        self.entries("transactions")
    }

    /// Entries of `accounts[]`, each required to be an object.
    pub fn accounts(&self) -> Result<Vec<&Map<String, Value>>, ArtifactError> {
        self.entries("accounts")
    }

    fn entries(&self, key: &str) -> Result<Vec<&Map<String, Value>>, ArtifactError> {
        let Some(items) = self.payload.get(key).and_then(Value::as_array) else {
            return Ok(Vec::new());
        };
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_object().ok_or_else(|| {
                    ArtifactError::malformed(
                        &self.path,
                        format!("{key}[{i}] is {}, expected an object", kind_of(item)),
                    )
                })
            })
            .collect()
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
