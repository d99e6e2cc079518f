//! Per-artifact claims.
//!
//! Before a transformer touches a pending artifact it creates a lease blob
//! `claims/{file}.lease` with the store's create-if-absent primitive. Only the
//! invocation that created the lease processes the artifact. Leases older
//! than the TTL are treated as abandoned (the owner crashed) and broken.
//!
//! Breaking is a delete followed by create-if-absent, so two workers breaking
//! the same expired lease can each end up believing they hold it. The holder
//! re-reads the lease with [`ClaimManager::holds`] before any destructive
//! step; that narrows the window to the time between the check and the step
//! but does not close it.

use crate::error::JobError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use txnflow_core::data::BlobStore;
use txnflow_core::domain::artifact;

/// Contents of a lease blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    pub owner: String,
    pub artifact: String,
    pub claimed_at: DateTime<Utc>,
}

/// A lease held by this process.
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub artifact: String,
    pub lease_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Acquired(Claim),
    /// Someone else holds a live lease.
    Held { owner: String },
}

pub struct ClaimManager<'a> {
    store: &'a dyn BlobStore,
    container: String,
    owner: String,
    ttl: Duration,
}

impl<'a> ClaimManager<'a> {
    pub fn with_owner(
        store: &'a dyn BlobStore,
        container: impl Into<String>,
        ttl: Duration,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            store,
            container: container.into(),
            owner: owner.into(),
            ttl,
        }
    }

    /// Try to take the lease for a pending artifact.
    pub fn try_claim(&self, artifact_path: &str, now: DateTime<Utc>) -> Result<ClaimOutcome, JobError> {
        let lease_path = artifact::lease_path(artifact_path);
        let lease = Lease {
            owner: self.owner.clone(),
            artifact: artifact_path.to_string(),
            claimed_at: now,
        };
        let body = serde_json::to_vec(&lease)?;
        let acquired = || {
            ClaimOutcome::Acquired(Claim {
                artifact: artifact_path.to_string(),
                lease_path: lease_path.clone(),
            })
        };

        if self.store.put_if_absent(&self.container, &lease_path, &body)? {
            return Ok(acquired());
        }

        let existing = match self.read_lease(&lease_path)? {
            // Released between our attempt and the read.
            None => {
                return Ok(if self.store.put_if_absent(&self.container, &lease_path, &body)? {
                    acquired()
                } else {
                    ClaimOutcome::Held {
                        owner: "unknown".into(),
                    }
                });
            }
            Some(Err(reason)) => {
                log::warn!("unreadable lease {lease_path} ({reason}); treating as held");
                return Ok(ClaimOutcome::Held {
                    owner: "<unreadable>".into(),
                });
            }
            Some(Ok(existing)) => existing,
        };

        if !self.is_expired(&existing, now) {
            return Ok(ClaimOutcome::Held {
                owner: existing.owner,
            });
        }

        log::warn!(
            "breaking expired lease on {artifact_path} held by {} since {}",
            existing.owner,
            existing.claimed_at
        );
        match self.store.delete(&self.container, &lease_path) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        Ok(if self.store.put_if_absent(&self.container, &lease_path, &body)? {
            acquired()
        } else {
            ClaimOutcome::Held {
                owner: "unknown".into(),
            }
        })
    }

    /// Whether the lease behind `claim` still names this owner.
    pub fn holds(&self, claim: &Claim) -> Result<bool, JobError> {
        Ok(matches!(
            self.read_lease(&claim.lease_path)?,
            Some(Ok(lease)) if lease.owner == self.owner
        ))
    }

    /// Release a lease this manager acquired.
    ///
    /// A lease that has since been broken and re-taken by another owner is
    /// left alone.
    pub fn release(&self, claim: &Claim) -> Result<(), JobError> {
        match self.read_lease(&claim.lease_path)? {
            None => Ok(()),
            Some(Ok(lease)) if lease.owner != self.owner => {
                log::warn!(
                    "lease on {} now held by {}; not releasing",
                    claim.artifact,
                    lease.owner
                );
                Ok(())
            }
            Some(_) => match self.store.delete(&self.container, &claim.lease_path) {
                Ok(()) => Ok(()),
                Err(e) if e.is_not_found() => Ok(()),
                Err(e) => Err(e.into()),
            },
        }
    }

    fn is_expired(&self, lease: &Lease, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(lease.claimed_at);
        age.to_std().map(|age| age >= self.ttl).unwrap_or(false)
    }

    /// `None` if no lease exists, `Some(Err)` if it can't be decoded.
    fn read_lease(&self, lease_path: &str) -> Result<Option<Result<Lease, String>>, JobError> {
        match self.store.get(&self.container, lease_path) {
            Ok(bytes) => Ok(Some(
                serde_json::from_slice::<Lease>(&bytes).map_err(|e| e.to_string()),
            )),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-unique owner id: pid plus 64 random bits.
pub fn generate_owner_id() -> String {
    format!("{}-{:016x}", std::process::id(), rand::random::<u64>())
}
