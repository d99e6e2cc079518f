//! Single-threaded trigger loop.
//!
//! Each tick checks the monthly timer (extraction) and the pending-prefix
//! watcher (transform). Job failures are logged and the loop keeps going;
//! only the shutdown flag ends it.

use crate::extract::Extractor;
use crate::schedule::{PendingWatcher, ScheduleOptions, Scheduler};
use crate::transform::Transformer;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use txnflow_core::data::BlobStore;

/// Counters for what the loop did before shutting down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaemonSummary {
    pub ticks: u64,
    pub extractions: u32,
    pub extraction_failures: u32,
    pub transforms: u32,
    pub artifact_failures: u32,
}

pub fn run_daemon(
    extractor: &Extractor<'_>,
    transformer: &Transformer<'_>,
    store: &dyn BlobStore,
    options: &ScheduleOptions,
    shutdown: &AtomicBool,
) -> DaemonSummary {
    let mut scheduler = Scheduler::new(Utc::now(), options.run_on_startup);
    let mut watcher = PendingWatcher::new(options.watch_interval);
    let mut summary = DaemonSummary::default();

    log::info!(
        "daemon started; next scheduled extraction at {}",
        scheduler.next_fire()
    );

    while !shutdown.load(Ordering::Relaxed) {
        summary.ticks += 1;
        let now = Utc::now();

        if scheduler.extract_due(now) {
            summary.extractions += 1;
            match extractor.run(now.date_naive()) {
                Ok(report) => log::info!("extraction wrote {}", report.blob_path),
                Err(e) => {
                    summary.extraction_failures += 1;
                    log::error!("extraction failed: {e}");
                }
            }
            log::info!("next scheduled extraction at {}", scheduler.next_fire());
        }

        match watcher.poll(store, transformer.raw_container(), now) {
            Ok(true) => {
                summary.transforms += 1;
                match transformer.run(now.date_naive()) {
                    Ok(report) => summary.artifact_failures += report.failed() as u32,
                    Err(e) => log::error!("transform failed: {e}"),
                }
            }
            Ok(false) => {}
            Err(e) => log::warn!("pending watch failed: {e}"),
        }

        std::thread::sleep(options.tick);
    }

    log::info!("daemon stopping after {} ticks", summary.ticks);
    summary
}
