use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use serde_json::json;
use std::time::Duration;
use txnflow_core::data::{BlobInfo, BlobStore, FsBlobStore, MemoryBlobStore, StorageError};
use txnflow_runner::{
    ArtifactOutcome, JobError, Lease, OutputNaming, PollSchedule, SkipReason, TransformOptions,
    Transformer,
};

const RAW: &str = "raw-data";
const OUT: &str = "transformed-data";
const FEB: &str = "to_process/plaid_raw_20240201_20240229.json";
const JAN: &str = "to_process/plaid_raw_20240101_20240131.json";

fn options(naming: OutputNaming) -> TransformOptions {
    TransformOptions {
        output_naming: naming,
        settle: PollSchedule::new(Duration::from_millis(1), Duration::from_millis(100)),
        lease_ttl: Duration::from_secs(600),
    }
}

fn march(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

fn minimal_payload() -> Vec<u8> {
    serde_json::to_vec_pretty(&json!({
        "transactions": [
            {"transaction_id": "t1", "amount": 12.5, "date": "2024-02-03", "pending": null}
        ],
        "accounts": [
            {"account_id": "a1", "name": null, "balances": {"current": null}}
        ]
    }))
    .unwrap()
}

fn seeded(store: &dyn BlobStore, artifacts: &[(&str, &[u8])]) {
    store.ensure_container(RAW).unwrap();
    for (name, body) in artifacts {
        store.put(RAW, name, body).unwrap();
    }
}

fn text(store: &dyn BlobStore, container: &str, name: &str) -> String {
    String::from_utf8(store.get(container, name).unwrap()).unwrap()
}

#[test]
fn end_to_end_transform_and_archive() {
    let store = MemoryBlobStore::new();
    let payload = minimal_payload();
    seeded(&store, &[(FEB, payload.as_slice())]);

    let transformer = Transformer::new(&store, RAW, OUT, options(OutputNaming::Invocation));
    let report = transformer.run(march(1)).unwrap();

    assert_eq!(report.window.tag(), "20240201_20240229");
    assert_eq!(report.transformed(), 1);
    assert!(!report.has_failures());

    let transactions = text(&store, OUT, "transactions_data/transactions_transformed_20240201_20240229.csv");
    let rows: Vec<&str> = transactions.lines().collect();
    assert_eq!(
        rows,
        vec![
            "transaction_id,account_id,amount,iso_currency_code,date,transaction_type,confidence_level,pending,category,merchant_name,payment_channel,website",
            "t1,,12.5,UNKNOWN,2024-02-03,Unknown,,false,Uncategorized,Unknown,Unknown,",
        ]
    );

    let accounts = text(&store, OUT, "accounts_data/accounts_transformed_20240201_20240229.csv");
    let rows: Vec<&str> = accounts.lines().collect();
    assert_eq!(
        rows,
        vec![
            "account_id,name,official_name,type,subtype,holder_category,current_balance,available_balance,iso_currency_code",
            "a1,Unknown Account,Unknown Account,Unknown,Unknown,Unknown,0.0,0.0,UNKNOWN",
        ]
    );

    // archived byte for byte, source gone, lease released
    assert!(!store.exists(RAW, FEB).unwrap());
    assert_eq!(
        store.get(RAW, "processed/plaid_raw_20240201_20240229.json").unwrap(),
        payload
    );
    assert!(store.list(RAW, "claims/").unwrap().is_empty());

    match &report.outcomes[0] {
        ArtifactOutcome::Transformed { artifact, result } => {
            assert_eq!(artifact, FEB);
            assert_eq!(result.transactions, 1);
            assert_eq!(result.accounts, 1);
            assert_eq!(result.archived_to, "processed/plaid_raw_20240201_20240229.json");
        }
        other => panic!("expected transformed, got {other:?}"),
    }
}

#[test]
fn second_run_finds_nothing() {
    let store = MemoryBlobStore::new();
    seeded(&store, &[(FEB, minimal_payload().as_slice())]);
    let transformer = Transformer::new(&store, RAW, OUT, options(OutputNaming::Invocation));

    transformer.run(march(1)).unwrap();
    let again = transformer.run(march(1)).unwrap();
    assert!(again.outcomes.is_empty());
}

#[test]
fn empty_pending_prefix_is_a_noop() {
    let store = MemoryBlobStore::new();
    let transformer = Transformer::new(&store, RAW, OUT, options(OutputNaming::Invocation));

    // raw container doesn't even exist yet
    let report = transformer.run(march(1)).unwrap();
    assert!(report.outcomes.is_empty());

    store.ensure_container(RAW).unwrap();
    store.put(RAW, "to_process/readme.txt", b"not an artifact").unwrap();
    let report = transformer.run(march(1)).unwrap();
    assert!(report.outcomes.is_empty());

    // output container untouched
    assert!(matches!(
        store.list(OUT, ""),
        Err(StorageError::ContainerNotFound { .. })
    ));
}

#[test]
fn malformed_artifact_fails_alone() {
    let store = MemoryBlobStore::new();
    seeded(&store, &[(JAN, &b"[1, 2, 3]"[..]), (FEB, minimal_payload().as_slice())]);

    let transformer = Transformer::new(&store, RAW, OUT, options(OutputNaming::Artifact));
    let report = transformer.run(march(1)).unwrap();

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.transformed(), 1);

    let failed = report.outcomes.iter().find(|o| o.is_failed()).unwrap();
    assert_eq!(failed.artifact(), JAN);
    assert!(matches!(
        failed,
        ArtifactOutcome::Failed {
            error: JobError::Artifact(_),
            ..
        }
    ));

    // the bad one stays pending, the good one is archived
    assert!(store.exists(RAW, JAN).unwrap());
    assert!(!store.exists(RAW, FEB).unwrap());
    assert!(store.exists(RAW, "processed/plaid_raw_20240201_20240229.json").unwrap());
    assert!(store.list(RAW, "claims/").unwrap().is_empty());
}

#[test]
fn live_lease_held_elsewhere_is_skipped() {
    let store = MemoryBlobStore::new();
    seeded(&store, &[(FEB, minimal_payload().as_slice())]);
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 5, 0).unwrap();
    let lease = Lease {
        owner: "worker-b".into(),
        artifact: FEB.into(),
        claimed_at: now - ChronoDuration::seconds(30),
    };
    store
        .put(
            RAW,
            "claims/plaid_raw_20240201_20240229.json.lease",
            &serde_json::to_vec(&lease).unwrap(),
        )
        .unwrap();

    let transformer = Transformer::new(&store, RAW, OUT, options(OutputNaming::Invocation))
        .with_owner("worker-a");
    let report = transformer.run_at(march(1), now).unwrap();

    assert!(matches!(
        &report.outcomes[0],
        ArtifactOutcome::Skipped { reason: SkipReason::Held { owner }, .. } if owner == "worker-b"
    ));
    assert!(store.exists(RAW, FEB).unwrap());
    assert!(store.list(OUT, "").unwrap().is_empty());
    // the other worker's lease is untouched
    assert!(store
        .exists(RAW, "claims/plaid_raw_20240201_20240229.json.lease")
        .unwrap());
}

#[test]
fn expired_lease_is_broken_and_artifact_processed() {
    let store = MemoryBlobStore::new();
    seeded(&store, &[(FEB, minimal_payload().as_slice())]);
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 1, 0, 0).unwrap();
    let lease = Lease {
        owner: "crashed-worker".into(),
        artifact: FEB.into(),
        claimed_at: now - ChronoDuration::minutes(45),
    };
    store
        .put(
            RAW,
            "claims/plaid_raw_20240201_20240229.json.lease",
            &serde_json::to_vec(&lease).unwrap(),
        )
        .unwrap();

    let transformer = Transformer::new(&store, RAW, OUT, options(OutputNaming::Invocation));
    let report = transformer.run_at(march(1), now).unwrap();

    assert_eq!(report.transformed(), 1);
    assert!(!store.exists(RAW, FEB).unwrap());
    assert!(store.list(RAW, "claims/").unwrap().is_empty());
}

/// Memory store that replays what a concurrent peer would do.
struct RacingPeer {
    inner: MemoryBlobStore,
    /// Pending listing taken before the peer archived everything.
    stale_pending: Option<Vec<BlobInfo>>,
    /// Lease owner the peer writes over ours once our CSVs land.
    steal_lease_as: Option<&'static str>,
}

impl RacingPeer {
    fn new(inner: MemoryBlobStore) -> Self {
        Self {
            inner,
            stale_pending: None,
            steal_lease_as: None,
        }
    }
}

impl BlobStore for RacingPeer {
    fn describe(&self) -> String {
        "racing peer".into()
    }

    fn ensure_container(&self, container: &str) -> Result<(), StorageError> {
        self.inner.ensure_container(container)
    }

    fn list(&self, container: &str, prefix: &str) -> Result<Vec<BlobInfo>, StorageError> {
        if let (RAW, "to_process/", Some(pending)) = (container, prefix, &self.stale_pending) {
            return Ok(pending.clone());
        }
        self.inner.list(container, prefix)
    }

    fn get(&self, container: &str, name: &str) -> Result<Vec<u8>, StorageError> {
        self.inner.get(container, name)
    }

    fn put(&self, container: &str, name: &str, data: &[u8]) -> Result<(), StorageError> {
        self.inner.put(container, name, data)?;
        if let (OUT, Some(owner)) = (container, self.steal_lease_as) {
            let lease = Lease {
                owner: owner.into(),
                artifact: FEB.into(),
                claimed_at: Utc::now(),
            };
            self.inner.put(
                RAW,
                "claims/plaid_raw_20240201_20240229.json.lease",
                &serde_json::to_vec(&lease).unwrap(),
            )?;
        }
        Ok(())
    }

    fn put_if_absent(
        &self,
        container: &str,
        name: &str,
        data: &[u8],
    ) -> Result<bool, StorageError> {
        self.inner.put_if_absent(container, name, data)
    }

    fn copy(&self, container: &str, source: &str, dest: &str) -> Result<(), StorageError> {
        self.inner.copy(container, source, dest)
    }

    fn delete(&self, container: &str, name: &str) -> Result<(), StorageError> {
        self.inner.delete(container, name)
    }

    fn exists(&self, container: &str, name: &str) -> Result<bool, StorageError> {
        self.inner.exists(container, name)
    }
}

#[test]
fn artifact_archived_by_peer_after_listing_is_skipped() {
    let inner = MemoryBlobStore::new();
    seeded(&inner, &[(FEB, minimal_payload().as_slice())]);
    let pending = inner.list(RAW, "to_process/").unwrap();

    let peer = Transformer::new(&inner, RAW, OUT, options(OutputNaming::Invocation))
        .with_owner("worker-a");
    assert_eq!(peer.run(march(1)).unwrap().transformed(), 1);
    let outputs = store_outputs(&inner);

    let mut store = RacingPeer::new(inner);
    store.stale_pending = Some(pending);
    let late = Transformer::new(&store, RAW, OUT, options(OutputNaming::Invocation))
        .with_owner("worker-b");
    let report = late.run(march(1)).unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert!(!report.has_failures());
    assert!(matches!(
        &report.outcomes[0],
        ArtifactOutcome::Skipped { artifact, reason: SkipReason::AlreadyArchived } if artifact == FEB
    ));
    // lease released, outputs untouched
    assert!(store.list(RAW, "claims/").unwrap().is_empty());
    assert_eq!(store_outputs(&store.inner), outputs);
}

#[test]
fn lease_taken_over_mid_transform_is_not_archived() {
    let inner = MemoryBlobStore::new();
    seeded(&inner, &[(FEB, minimal_payload().as_slice())]);
    let mut store = RacingPeer::new(inner);
    store.steal_lease_as = Some("worker-c");

    let transformer = Transformer::new(&store, RAW, OUT, options(OutputNaming::Invocation))
        .with_owner("worker-b");
    let report = transformer.run(march(1)).unwrap();

    assert!(matches!(
        &report.outcomes[0],
        ArtifactOutcome::Failed { error: JobError::LeaseLost { artifact }, .. } if artifact == FEB
    ));
    // the new holder finishes the job: source untouched, its lease kept
    assert!(store.exists(RAW, FEB).unwrap());
    assert!(store.list(RAW, "processed/").unwrap().is_empty());
    let lease: Lease = serde_json::from_slice(
        &store
            .get(RAW, "claims/plaid_raw_20240201_20240229.json.lease")
            .unwrap(),
    )
    .unwrap();
    assert_eq!(lease.owner, "worker-c");
}

fn store_outputs(store: &dyn BlobStore) -> Vec<(String, Vec<u8>)> {
    store
        .list(OUT, "")
        .unwrap()
        .into_iter()
        .map(|b| {
            let body = store.get(OUT, &b.name).unwrap();
            (b.name, body)
        })
        .collect()
}

#[test]
fn invocation_naming_uses_run_window() {
    let store = MemoryBlobStore::new();
    seeded(&store, &[(FEB, minimal_payload().as_slice())]);

    // run in April: the February artifact is labelled with March's window
    let transformer = Transformer::new(&store, RAW, OUT, options(OutputNaming::Invocation));
    transformer
        .run(NaiveDate::from_ymd_opt(2024, 4, 10).unwrap())
        .unwrap();

    let names: Vec<String> = store.list(OUT, "").unwrap().into_iter().map(|b| b.name).collect();
    assert_eq!(
        names,
        vec![
            "accounts_data/accounts_transformed_20240301_20240331.csv",
            "transactions_data/transactions_transformed_20240301_20240331.csv",
        ]
    );
}

#[test]
fn artifact_naming_uses_artifact_window() {
    let store = MemoryBlobStore::new();
    let payload = minimal_payload();
    seeded(&store, &[(JAN, payload.as_slice()), (FEB, payload.as_slice())]);

    let transformer = Transformer::new(&store, RAW, OUT, options(OutputNaming::Artifact));
    let report = transformer
        .run(NaiveDate::from_ymd_opt(2024, 4, 10).unwrap())
        .unwrap();
    assert_eq!(report.transformed(), 2);

    let names: Vec<String> = store.list(OUT, "").unwrap().into_iter().map(|b| b.name).collect();
    assert_eq!(
        names,
        vec![
            "accounts_data/accounts_transformed_20240101_20240131.csv",
            "accounts_data/accounts_transformed_20240201_20240229.csv",
            "transactions_data/transactions_transformed_20240101_20240131.csv",
            "transactions_data/transactions_transformed_20240201_20240229.csv",
        ]
    );
}

#[test]
fn filesystem_store_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsBlobStore::new(dir.path());
    let payload = minimal_payload();
    seeded(&store, &[(FEB, payload.as_slice())]);

    let transformer = Transformer::new(&store, RAW, OUT, options(OutputNaming::Invocation));
    let report = transformer.run(march(20)).unwrap();
    assert_eq!(report.transformed(), 1);

    let archived = dir
        .path()
        .join(RAW)
        .join("processed")
        .join("plaid_raw_20240201_20240229.json");
    assert_eq!(std::fs::read(archived).unwrap(), payload);
    assert!(!dir.path().join(RAW).join(FEB).exists());
    assert!(dir
        .path()
        .join(OUT)
        .join("transactions_data")
        .join("transactions_transformed_20240201_20240229.csv")
        .is_file());
}
