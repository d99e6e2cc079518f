//! Snapshot of pipeline state across both containers.

use crate::claim::Lease;
use txnflow_core::data::{BlobInfo, BlobStore, StorageError};
use txnflow_core::domain::artifact;

#[derive(Debug, Clone, PartialEq)]
pub struct LeaseEntry {
    pub path: String,
    /// `None` when the lease blob can't be decoded.
    pub lease: Option<Lease>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStatus {
    pub pending: Vec<BlobInfo>,
    pub processed: Vec<BlobInfo>,
    pub leases: Vec<LeaseEntry>,
    pub outputs: Vec<BlobInfo>,
}

/// Missing containers read as empty.
pub fn collect_status(
    store: &dyn BlobStore,
    raw_container: &str,
    output_container: &str,
) -> Result<PipelineStatus, StorageError> {
    let leases = list_or_empty(store, raw_container, artifact::CLAIMS_PREFIX)?
        .into_iter()
        .map(|blob| {
            let lease = match store.get(raw_container, &blob.name) {
                Ok(bytes) => serde_json::from_slice(&bytes).ok(),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            };
            Ok(LeaseEntry {
                path: blob.name,
                lease,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PipelineStatus {
        pending: list_or_empty(store, raw_container, artifact::PENDING_PREFIX)?,
        processed: list_or_empty(store, raw_container, artifact::PROCESSED_PREFIX)?,
        leases,
        outputs: list_or_empty(store, output_container, "")?,
    })
}

fn list_or_empty(
    store: &dyn BlobStore,
    container: &str,
    prefix: &str,
) -> Result<Vec<BlobInfo>, StorageError> {
    match store.list(container, prefix) {
        Err(StorageError::ContainerNotFound { .. }) => Ok(Vec::new()),
        other => other,
    }
}
