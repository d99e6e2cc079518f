//! Transform job: pending raw artifacts → CSV batches, then archival.
//!
//! Each artifact is claimed, normalized, written and archived on its own.
//! A failure in one artifact is recorded in its outcome and the batch moves
//! on; only listing the pending prefix or preparing the output container can
//! fail the whole invocation.

use crate::archive::archive_artifact;
use crate::claim::{generate_owner_id, Claim, ClaimManager, ClaimOutcome};
use crate::error::JobError;
use crate::poll::PollSchedule;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use txnflow_core::data::{BlobStore, StorageError};
use txnflow_core::domain::artifact;
use txnflow_core::{normalize, RawArtifact, ReportingWindow};

/// Which window names the output files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputNaming {
    /// The window computed when the transform invocation starts.
    #[default]
    Invocation,
    /// The window encoded in the artifact's own file name, falling back to
    /// the invocation window when the name carries none.
    Artifact,
}

impl fmt::Display for OutputNaming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Invocation => "invocation",
            Self::Artifact => "artifact",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformOptions {
    pub output_naming: OutputNaming,
    /// Polling for an archival copy to become readable.
    pub settle: PollSchedule,
    /// Age after which another worker's lease is considered abandoned.
    pub lease_ttl: Duration,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            output_naming: OutputNaming::Invocation,
            settle: PollSchedule::new(Duration::from_millis(200), Duration::from_secs(10)),
            lease_ttl: Duration::from_secs(600),
        }
    }
}

/// Result of one successfully transformed artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedArtifact {
    pub window: ReportingWindow,
    pub transactions_blob: String,
    pub accounts_blob: String,
    pub transactions: usize,
    pub accounts: usize,
    pub archived_to: String,
}

/// Why an artifact was left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Another worker holds a live lease.
    Held { owner: String },
    /// Listed as pending, but gone by the time the lease was taken.
    AlreadyArchived,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Held { owner } => write!(f, "claimed by {owner}"),
            Self::AlreadyArchived => f.write_str("already archived by another worker"),
        }
    }
}

#[derive(Debug)]
pub enum ArtifactOutcome {
    Transformed {
        artifact: String,
        result: TransformedArtifact,
    },
    Skipped { artifact: String, reason: SkipReason },
    Failed { artifact: String, error: JobError },
}

impl ArtifactOutcome {
    pub fn artifact(&self) -> &str {
        match self {
            Self::Transformed { artifact, .. }
            | Self::Skipped { artifact, .. }
            | Self::Failed { artifact, .. } => artifact,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug)]
pub struct TransformReport {
    /// Window computed at the start of the invocation.
    pub window: ReportingWindow,
    pub outcomes: Vec<ArtifactOutcome>,
}

impl TransformReport {
    pub fn transformed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ArtifactOutcome::Transformed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ArtifactOutcome::Skipped { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(ArtifactOutcome::is_failed)
    }
}

pub struct Transformer<'a> {
    store: &'a dyn BlobStore,
    raw_container: String,
    output_container: String,
    options: TransformOptions,
    owner: String,
}

impl<'a> Transformer<'a> {
    pub fn new(
        store: &'a dyn BlobStore,
        raw_container: impl Into<String>,
        output_container: impl Into<String>,
        options: TransformOptions,
    ) -> Self {
        Self {
            store,
            raw_container: raw_container.into(),
            output_container: output_container.into(),
            options,
            owner: generate_owner_id(),
        }
    }

    /// Override the lease owner id.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn raw_container(&self) -> &str {
        &self.raw_container
    }

    pub fn run(&self, reference: NaiveDate) -> Result<TransformReport, JobError> {
        self.run_at(reference, Utc::now())
    }

    /// Like [`run`](Self::run) with an explicit clock for lease timestamps.
    pub fn run_at(
        &self,
        reference: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<TransformReport, JobError> {
        let window = ReportingWindow::for_reference_date(reference);
        let pending = self.list_pending()?;
        let mut report = TransformReport {
            window,
            outcomes: Vec::with_capacity(pending.len()),
        };

        if pending.is_empty() {
            log::info!("no pending artifacts in {}", self.raw_container);
            return Ok(report);
        }
        log::info!(
            "transforming {} pending artifact(s), invocation window {window}, naming {}",
            pending.len(),
            self.options.output_naming
        );

        self.store.ensure_container(&self.output_container)?;
        let claims = ClaimManager::with_owner(
            self.store,
            self.raw_container.clone(),
            self.options.lease_ttl,
            self.owner.clone(),
        );
        let mut written: HashSet<String> = HashSet::new();

        for name in pending {
            let outcome = match claims.try_claim(&name, now) {
                Ok(ClaimOutcome::Held { owner }) => {
                    log::warn!("skipping {name}: claimed by {owner}");
                    ArtifactOutcome::Skipped {
                        artifact: name,
                        reason: SkipReason::Held { owner },
                    }
                }
                Ok(ClaimOutcome::Acquired(claim)) => {
                    let result = self.process(&name, &window, &claims, &claim);
                    if let Err(e) = claims.release(&claim) {
                        log::warn!("failed to release lease on {name}: {e}");
                    }
                    match result {
                        Ok(None) => {
                            log::info!("skipping {name}: no longer pending");
                            ArtifactOutcome::Skipped {
                                artifact: name,
                                reason: SkipReason::AlreadyArchived,
                            }
                        }
                        Ok(Some(result)) => {
                            if !written.insert(result.transactions_blob.clone()) {
                                log::warn!(
                                    "{name} overwrote {} written earlier in this run",
                                    result.transactions_blob
                                );
                            }
                            ArtifactOutcome::Transformed {
                                artifact: name,
                                result,
                            }
                        }
                        Err(error) => {
                            log::warn!("failed to transform {name}: {error}");
                            ArtifactOutcome::Failed {
                                artifact: name,
                                error,
                            }
                        }
                    }
                }
                Err(error) => {
                    log::warn!("failed to claim {name}: {error}");
                    ArtifactOutcome::Failed {
                        artifact: name,
                        error,
                    }
                }
            };
            report.outcomes.push(outcome);
        }

        log::info!(
            "transform finished: {} transformed, {} skipped, {} failed",
            report.transformed(),
            report.skipped(),
            report.failed()
        );
        Ok(report)
    }

    /// Pending artifact names, sorted. A missing raw container has none.
    fn list_pending(&self) -> Result<Vec<String>, JobError> {
        let blobs = match self.store.list(&self.raw_container, artifact::PENDING_PREFIX) {
            Ok(blobs) => blobs,
            Err(StorageError::ContainerNotFound { .. }) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let mut names: Vec<String> = blobs
            .into_iter()
            .map(|b| b.name)
            .filter(|n| artifact::is_pending_artifact(n))
            .collect();
        names.sort();
        Ok(names)
    }

    /// `Ok(None)` when the artifact vanished between listing and claiming,
    /// which means a peer already transformed and archived it.
    fn process(
        &self,
        name: &str,
        invocation: &ReportingWindow,
        claims: &ClaimManager<'_>,
        claim: &Claim,
    ) -> Result<Option<TransformedArtifact>, JobError> {
        let bytes = match self.store.get(&self.raw_container, name) {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let raw = RawArtifact::parse(name, &bytes)?;
        let batch = normalize(&raw)?;

        let window = match self.options.output_naming {
            OutputNaming::Invocation => *invocation,
            OutputNaming::Artifact => raw.window().unwrap_or_else(|| {
                log::warn!("{name} has no window in its name; using {invocation}");
                *invocation
            }),
        };

        let transactions_blob = artifact::transactions_output_path(&window);
        let accounts_blob = artifact::accounts_output_path(&window);
        let transactions_csv = batch.transactions_csv()?;
        let accounts_csv = batch.accounts_csv()?;

        self.store
            .put(&self.output_container, &transactions_blob, transactions_csv.as_bytes())?;
        self.store
            .put(&self.output_container, &accounts_blob, accounts_csv.as_bytes())?;
        log::info!(
            "{name}: wrote {} transactions to {transactions_blob}, {} accounts to {accounts_blob}",
            batch.transactions.len(),
            batch.accounts.len()
        );

        if !claims.holds(claim)? {
            return Err(JobError::LeaseLost {
                artifact: name.to_string(),
            });
        }
        let archived_to = archive_artifact(
            self.store,
            &self.raw_container,
            name,
            &bytes,
            self.options.settle,
        )?;

        Ok(Some(TransformedArtifact {
            window,
            transactions_blob,
            accounts_blob,
            transactions: batch.transactions.len(),
            accounts: batch.accounts.len(),
            archived_to,
        }))
    }
}
