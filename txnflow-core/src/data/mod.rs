//! External collaborators: blob storage and the aggregation API.

pub mod api;
pub mod fs_store;
pub mod memory_store;
pub mod plaid;
pub mod storage;

pub use api::{AggregationApi, ApiError};
pub use fs_store::FsBlobStore;
pub use memory_store::MemoryBlobStore;
pub use plaid::{PlaidClient, PlaidCredentials, SANDBOX_HOST};
pub use storage::{open_store, BlobInfo, BlobStore, StorageError};
