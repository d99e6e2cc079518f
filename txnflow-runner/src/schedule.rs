//! Triggers for the daemon: the monthly extraction timer and the
//! new-pending-blob watcher.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use std::collections::HashSet;
use std::time::Duration;
use txnflow_core::data::{BlobStore, StorageError};
use txnflow_core::domain::artifact;

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleOptions {
    /// Fire one extraction as soon as the daemon starts.
    pub run_on_startup: bool,
    pub watch_interval: Duration,
    /// Daemon loop period.
    pub tick: Duration,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            run_on_startup: true,
            watch_interval: Duration::from_secs(10),
            tick: Duration::from_secs(1),
        }
    }
}

/// First 00:00 UTC on the 1st of a month strictly after `after`.
pub fn next_monthly_fire(after: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = match after.month() {
        12 => (after.year() + 1, 1),
        m => (after.year(), m + 1),
    };
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    Utc.from_utc_datetime(&first)
}

/// Monthly extraction timer.
#[derive(Debug, Clone)]
pub struct Scheduler {
    next_fire: DateTime<Utc>,
    startup_pending: bool,
}

impl Scheduler {
    pub fn new(now: DateTime<Utc>, run_on_startup: bool) -> Self {
        Self {
            next_fire: next_monthly_fire(now),
            startup_pending: run_on_startup,
        }
    }

    pub fn next_fire(&self) -> DateTime<Utc> {
        self.next_fire
    }

    /// Whether extraction should run now. Consumes the trigger.
    ///
    /// Several missed months (a suspended host) collapse into one run.
    pub fn extract_due(&mut self, now: DateTime<Utc>) -> bool {
        let startup = std::mem::take(&mut self.startup_pending);
        if now >= self.next_fire {
            self.next_fire = next_monthly_fire(now);
            return true;
        }
        startup
    }
}

/// Detects pending artifacts that were not there at the previous check.
#[derive(Debug, Clone)]
pub struct PendingWatcher {
    interval: chrono::Duration,
    next_check: Option<DateTime<Utc>>,
    seen: HashSet<String>,
}

impl PendingWatcher {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: chrono::Duration::from_std(interval)
                .unwrap_or_else(|_| chrono::Duration::seconds(10)),
            next_check: None,
            seen: HashSet::new(),
        }
    }

    /// List the pending prefix if the watch interval has elapsed and report
    /// whether any artifact appeared since the last listing. Artifacts
    /// already present at the first check count as new.
    pub fn poll(
        &mut self,
        store: &dyn BlobStore,
        container: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        if self.next_check.is_some_and(|next| now < next) {
            return Ok(false);
        }
        self.next_check = Some(now + self.interval);

        let current: HashSet<String> = match store.list(container, artifact::PENDING_PREFIX) {
            Ok(blobs) => blobs
                .into_iter()
                .map(|b| b.name)
                .filter(|n| artifact::is_pending_artifact(n))
                .collect(),
            Err(StorageError::ContainerNotFound { .. }) => HashSet::new(),
            Err(e) => return Err(e),
        };

        let fresh: Vec<&String> = current.difference(&self.seen).collect();
        let fired = !fresh.is_empty();
        if fired {
            log::info!("{} new pending artifact(s) in {container}", fresh.len());
        }
        self.seen = current;
        Ok(fired)
    }
}
