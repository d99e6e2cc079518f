//! Verified move of a consumed artifact from `to_process/` to `processed/`.
//!
//! The store's copy is not guaranteed to be visible immediately, so the
//! destination is polled until its BLAKE3 hash matches the source bytes.
//! The source is deleted only after that check passes.

use crate::error::JobError;
use crate::poll::{poll_until, PollOutcome, PollSchedule};
use txnflow_core::data::{BlobStore, StorageError};
use txnflow_core::domain::artifact;

/// Move `pending` to its `processed/` twin, verifying the copy first.
///
/// `expected` is the content the transformer actually consumed. Returns the
/// destination path.
pub fn archive_artifact(
    store: &dyn BlobStore,
    container: &str,
    pending: &str,
    expected: &[u8],
    settle: PollSchedule,
) -> Result<String, JobError> {
    let dest = artifact::processed_path(pending);
    let want = blake3::hash(expected);

    store.copy(container, pending, &dest)?;
    log::debug!("copied {container}/{pending} -> {dest}; waiting for it to settle");

    let outcome = poll_until(settle, || -> Result<Option<()>, StorageError> {
        match store.get(container, &dest) {
            Ok(bytes) if blake3::hash(&bytes) == want => Ok(Some(())),
            Ok(_) => Ok(None),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    })?;

    match outcome {
        PollOutcome::Ready(()) => {
            store.delete(container, pending)?;
            log::info!("archived {pending} -> {dest}");
            Ok(dest)
        }
        PollOutcome::TimedOut { waited, .. } => Err(JobError::CopyNotVerified {
            source_path: pending.to_string(),
            dest_path: dest,
            waited,
        }),
    }
}
