//! Domain types for txnflow

pub mod artifact;
pub mod records;
pub mod window;

pub use artifact::{ArtifactError, RawArtifact};
pub use records::{AccountRecord, CsvRecord, TransactionRecord};
pub use window::ReportingWindow;
