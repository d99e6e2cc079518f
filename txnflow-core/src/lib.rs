//! txnflow core: domain types, normalization rules, storage and API seams.
//!
//! This crate contains everything the two pipeline jobs share:
//! - Reporting window arithmetic and the blob naming layout
//! - Raw artifact parsing and projection into transaction/account records
//! - Cleaning rules, stable deduplication and CSV rendering
//! - The `BlobStore` trait with filesystem and in-memory backends
//! - The `AggregationApi` trait with a blocking Plaid client

pub mod data;
pub mod domain;
pub mod normalize;

pub use domain::{AccountRecord, ArtifactError, RawArtifact, ReportingWindow, TransactionRecord};
pub use normalize::{normalize, TransformedBatch};
