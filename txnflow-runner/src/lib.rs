//! txnflow runner: the extraction and transform jobs and what drives them.
//!
//! This crate builds on `txnflow-core` to provide:
//! - Environment + TOML configuration
//! - The extraction job (API handshake, readiness polling, raw artifact write)
//! - The transform job (claims, normalization, CSV output, verified archival)
//! - The monthly timer, pending-blob watcher and daemon loop
//! - A status snapshot of both containers

pub mod archive;
pub mod claim;
pub mod config;
pub mod daemon;
pub mod error;
pub mod extract;
pub mod poll;
pub mod schedule;
pub mod status;
pub mod transform;

pub use archive::archive_artifact;
pub use claim::{generate_owner_id, Claim, ClaimManager, ClaimOutcome, Lease};
pub use config::{ConfigError, Settings};
pub use daemon::{run_daemon, DaemonSummary};
pub use error::JobError;
pub use extract::{ExtractOptions, ExtractReport, Extractor};
pub use poll::{poll_until, PollOutcome, PollSchedule};
pub use schedule::{next_monthly_fire, PendingWatcher, ScheduleOptions, Scheduler};
pub use status::{collect_status, LeaseEntry, PipelineStatus};
pub use transform::{
    ArtifactOutcome, OutputNaming, SkipReason, TransformOptions, TransformReport, TransformedArtifact,
    Transformer,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn reports_are_send_sync() {
        assert_send::<ExtractReport>();
        assert_sync::<ExtractReport>();
        assert_send::<TransformReport>();
        assert_sync::<TransformReport>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<JobError>();
        assert_sync::<JobError>();
        assert_send::<ConfigError>();
        assert_sync::<ConfigError>();
    }

    #[test]
    fn jobs_are_send_sync() {
        assert_send::<Extractor<'static>>();
        assert_sync::<Extractor<'static>>();
        assert_send::<Transformer<'static>>();
        assert_sync::<Transformer<'static>>();
        assert_send::<Settings>();
        assert_sync::<Settings>();
    }
}
