//! Extraction job: API handshake → raw artifact in `to_process/`.
//!
//! Every API call happens before anything is written, so a failed run leaves
//! storage untouched. The artifact is written with a single overwrite `put`.

use crate::error::JobError;
use crate::poll::{poll_until, PollOutcome, PollSchedule};
use chrono::NaiveDate;
use serde_json::Value;
use std::time::Duration;
use txnflow_core::data::{AggregationApi, ApiError, BlobStore};
use txnflow_core::domain::artifact;
use txnflow_core::ReportingWindow;

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    pub institution_id: String,
    pub products: Vec<String>,
    /// Fixed wait between the token exchange and the first data request.
    pub readiness_delay: Duration,
    /// Polling while the API answers `PRODUCT_NOT_READY`.
    pub readiness: PollSchedule,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            institution_id: "ins_109508".to_string(),
            products: vec!["transactions".to_string()],
            readiness_delay: Duration::from_secs(5),
            readiness: PollSchedule::new(Duration::from_secs(2), Duration::from_secs(60)),
        }
    }
}

/// What one extraction wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractReport {
    pub window: ReportingWindow,
    pub container: String,
    pub blob_path: String,
    pub transactions: usize,
    pub accounts: usize,
    pub bytes: usize,
}

pub struct Extractor<'a> {
    api: &'a dyn AggregationApi,
    store: &'a dyn BlobStore,
    container: String,
    options: ExtractOptions,
}

impl<'a> Extractor<'a> {
    pub fn new(
        api: &'a dyn AggregationApi,
        store: &'a dyn BlobStore,
        container: impl Into<String>,
        options: ExtractOptions,
    ) -> Self {
        Self {
            api,
            store,
            container: container.into(),
            options,
        }
    }

    /// Extract the month before `reference`'s month.
    pub fn run(&self, reference: NaiveDate) -> Result<ExtractReport, JobError> {
        let window = ReportingWindow::for_reference_date(reference);
        log::info!("extracting {window} from {}", self.api.name());

        let public_token = self
            .api
            .create_sandbox_public_token(&self.options.institution_id, &self.options.products)?;
        log::info!("created sandbox public token for {}", self.options.institution_id);

        let access_token = self.api.exchange_public_token(&public_token)?;
        log::info!("exchanged public token for an access token");

        if !self.options.readiness_delay.is_zero() {
            log::info!(
                "waiting {:?} for the initial data pull",
                self.options.readiness_delay
            );
            std::thread::sleep(self.options.readiness_delay);
        }

        let document = self.fetch_when_ready(&access_token, &window)?;
        let transactions = count(&document, "transactions");
        let accounts = count(&document, "accounts");
        log::info!("fetched {transactions} transactions across {accounts} accounts");

        let body = serde_json::to_vec_pretty(&document)?;
        let blob_path = artifact::pending_path(&window);
        self.store.ensure_container(&self.container)?;
        self.store.put(&self.container, &blob_path, &body)?;
        log::info!("wrote {}/{blob_path} ({} bytes)", self.container, body.len());

        Ok(ExtractReport {
            window,
            container: self.container.clone(),
            blob_path,
            transactions,
            accounts,
            bytes: body.len(),
        })
    }

    fn fetch_when_ready(
        &self,
        access_token: &str,
        window: &ReportingWindow,
    ) -> Result<Value, JobError> {
        let outcome = poll_until(self.options.readiness, || {
            match self.api.get_transactions(access_token, window) {
                Ok(document) => Ok(Some(document)),
                Err(ApiError::ProductNotReady) => {
                    log::info!("transactions not ready yet; polling");
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })?;

        match outcome {
            PollOutcome::Ready(document) => Ok(document),
            PollOutcome::TimedOut { attempts, waited } => {
                Err(JobError::NotReadyTimeout { attempts, waited })
            }
        }
    }
}

fn count(document: &Value, key: &str) -> usize {
    document.get(key).and_then(Value::as_array).map_or(0, Vec::len)
}
