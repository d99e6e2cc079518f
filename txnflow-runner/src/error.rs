//! Job-level error type.

use std::time::Duration;
use thiserror::Error;
use txnflow_core::data::{ApiError, StorageError};
use txnflow_core::normalize::ExportError;
use txnflow_core::ArtifactError;

/// Errors from the extraction and transform jobs.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("upstream API error: {0}")]
    Api(#[from] ApiError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("csv export error: {0}")]
    Export(#[from] ExportError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("upstream data still not ready after {attempts} attempts over {waited:?}")]
    NotReadyTimeout { attempts: u32, waited: Duration },

    #[error("lease on {artifact} was taken over by another worker; not archiving")]
    LeaseLost { artifact: String },

    #[error("copy {source_path} -> {dest_path} not verified within {waited:?}; source left in place")]
    CopyNotVerified {
        source_path: String,
        dest_path: String,
        waited: Duration,
    },
}
