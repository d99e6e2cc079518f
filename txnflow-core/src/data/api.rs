//! Aggregation API trait and structured error types.
//!
//! The AggregationApi trait abstracts over the upstream financial data API so
//! the extractor can run against the Plaid HTTP client in production and a
//! scripted fake in tests.

use crate::domain::ReportingWindow;
use serde_json::Value;
use thiserror::Error;

/// Structured error types for upstream API calls.
///
/// These are designed to be displayable in both CLI and daemon logs.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("auth setup failed during {step}: {message}")]
    AuthSetup { step: &'static str, message: String },

    #[error("upstream request failed (HTTP {status}, {code}): {message}")]
    Request {
        status: u16,
        code: String,
        message: String,
    },

    #[error("upstream data not ready yet (PRODUCT_NOT_READY)")]
    ProductNotReady,

    #[error("network unreachable: {0}")]
    Network(String),

    #[error("response format changed: {0}")]
    ResponseFormat(String),
}

impl ApiError {
    /// Re-label a request failure from a handshake step as an auth setup
    /// failure. Other kinds pass through unchanged.
    pub fn into_auth_setup(self, step: &'static str) -> Self {
        match self {
            Self::Request { code, message, .. } => Self::AuthSetup {
                step,
                message: format!("{code}: {message}"),
            },
            other => other,
        }
    }
}

/// Trait for the upstream aggregation API.
///
/// Implementations handle transport and authentication. Callers see only the
/// three operations the extraction handshake needs.
pub trait AggregationApi: Send + Sync {
    /// Human-readable name of this API backend.
    fn name(&self) -> &str;

    /// Mint a sandbox public token for `institution_id` with `products` enabled.
    fn create_sandbox_public_token(
        &self,
        institution_id: &str,
        products: &[String],
    ) -> Result<String, ApiError>;

    /// Exchange a public token for a long-lived access token.
    fn exchange_public_token(&self, public_token: &str) -> Result<String, ApiError>;

    /// Fetch transactions and accounts for the window.
    ///
    /// Returns the full response document (`transactions`, `accounts` plus
    /// metadata) with dates rendered as strings.
    fn get_transactions(
        &self,
        access_token: &str,
        window: &ReportingWindow,
    ) -> Result<Value, ApiError>;
}
