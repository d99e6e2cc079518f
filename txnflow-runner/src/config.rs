//! Runtime configuration.
//!
//! Secrets and the storage connection come from the environment only. The
//! optional TOML file tunes the non-secret knobs; environment values win
//! over file values wherever both exist.

use crate::extract::ExtractOptions;
use crate::poll::PollSchedule;
use crate::schedule::ScheduleOptions;
use crate::transform::{OutputNaming, TransformOptions};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use txnflow_core::data::{PlaidCredentials, SANDBOX_HOST};

pub const ENV_CLIENT_ID: &str = "API_CLIENT_ID";
pub const ENV_SECRET: &str = "API_SECRET";
pub const ENV_CONNECTION: &str = "STORAGE_CONNECTION_STRING";
pub const ENV_RAW_CONTAINER: &str = "RAW_CONTAINER_NAME";
pub const ENV_OUTPUT_CONTAINER: &str = "OUTPUT_CONTAINER_NAME";
pub const ENV_API_HOST: &str = "API_HOST";
pub const ENV_CONFIG_PATH: &str = "TXNFLOW_CONFIG";

pub const DEFAULT_RAW_CONTAINER: &str = "raw-data";
pub const DEFAULT_OUTPUT_CONTAINER: &str = "transformed-data";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Where the blobs live.
#[derive(Clone, PartialEq)]
pub struct StorageSettings {
    pub connection_string: String,
    pub raw_container: String,
    pub output_container: String,
}

impl fmt::Debug for StorageSettings {
    // Connection strings for hosted stores embed account keys.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSettings")
            .field("connection_string", &"<redacted>")
            .field("raw_container", &self.raw_container)
            .field("output_container", &self.output_container)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiSettings {
    pub host: String,
    pub institution_id: String,
    pub products: Vec<String>,
    pub timeout_secs: u64,
    pub page_size: u32,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: SANDBOX_HOST.to_string(),
            institution_id: "ins_109508".to_string(),
            products: vec!["transactions".to_string()],
            timeout_secs: 30,
            page_size: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractSettings {
    pub readiness_delay_secs: u64,
    pub readiness_poll_secs: u64,
    pub readiness_timeout_secs: u64,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            readiness_delay_secs: 5,
            readiness_poll_secs: 2,
            readiness_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformSettings {
    pub output_naming: OutputNaming,
    pub settle_poll_ms: u64,
    pub settle_timeout_ms: u64,
    pub lease_ttl_secs: u64,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            output_naming: OutputNaming::default(),
            settle_poll_ms: 200,
            settle_timeout_ms: 10_000,
            lease_ttl_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleSettings {
    pub run_on_startup: bool,
    pub watch_interval_secs: u64,
    pub tick_millis: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            run_on_startup: true,
            watch_interval_secs: 10,
            tick_millis: 1000,
        }
    }
}

/// Shape of the optional TOML file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub api: ApiSettings,
    pub extract: ExtractSettings,
    pub transform: TransformSettings,
    pub schedule: ScheduleSettings,
}

/// Fully resolved settings for one process.
#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: PlaidCredentials,
    pub storage: StorageSettings,
    pub api: ApiSettings,
    pub extract: ExtractSettings,
    pub transform: TransformSettings,
    pub schedule: ScheduleSettings,
}

impl Settings {
    /// Load from the process environment plus an optional TOML file.
    ///
    /// The file is `path` if given, else `$TXNFLOW_CONFIG` if set.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok();
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env(ENV_CONFIG_PATH).filter(|p| !p.trim().is_empty()).map(PathBuf::from));

        let contents = match &path {
            Some(path) => {
                log::debug!("reading config file {}", path.display());
                Some(std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?)
            }
            None => None,
        };

        Self::from_sources(contents.as_deref(), env)
    }

    /// Resolve settings from file contents and an environment lookup.
    ///
    /// Blank environment values count as unset.
    pub fn from_sources(
        file: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let lookup = |key: &str| {
            env(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        let FileConfig {
            mut api,
            extract,
            transform,
            schedule,
        } = match file {
            Some(text) => toml::from_str(text)?,
            None => FileConfig::default(),
        };

        let credentials = PlaidCredentials {
            client_id: required(ENV_CLIENT_ID)?,
            secret: required(ENV_SECRET)?,
        };
        let storage = StorageSettings {
            connection_string: required(ENV_CONNECTION)?,
            raw_container: lookup(ENV_RAW_CONTAINER)
                .unwrap_or_else(|| DEFAULT_RAW_CONTAINER.to_string()),
            output_container: lookup(ENV_OUTPUT_CONTAINER)
                .unwrap_or_else(|| DEFAULT_OUTPUT_CONTAINER.to_string()),
        };
        if let Some(host) = lookup(ENV_API_HOST) {
            api.host = host;
        }

        let settings = Self {
            credentials,
            storage,
            api,
            extract,
            transform,
            schedule,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (key, name) in [
            (ENV_RAW_CONTAINER, &self.storage.raw_container),
            (ENV_OUTPUT_CONTAINER, &self.storage.output_container),
        ] {
            if name.contains('/') || name.starts_with('.') {
                return Err(invalid(key, format!("'{name}' is not a valid container name")));
            }
        }
        if self.storage.raw_container == self.storage.output_container {
            return Err(invalid(
                ENV_OUTPUT_CONTAINER,
                "output container must differ from the raw container",
            ));
        }

        if !(self.api.host.starts_with("https://") || self.api.host.starts_with("http://")) {
            return Err(invalid("api.host", format!("'{}' is not an http(s) URL", self.api.host)));
        }
        if self.api.institution_id.trim().is_empty() {
            return Err(invalid("api.institution_id", "must not be empty"));
        }
        if self.api.products.is_empty() {
            return Err(invalid("api.products", "at least one product is required"));
        }
        if !(1..=500).contains(&self.api.page_size) {
            return Err(invalid("api.page_size", "must be between 1 and 500"));
        }
        if self.api.timeout_secs == 0 {
            return Err(invalid("api.timeout_secs", "must be positive"));
        }

        for (key, value) in [
            ("extract.readiness_poll_secs", self.extract.readiness_poll_secs),
            ("transform.settle_poll_ms", self.transform.settle_poll_ms),
            ("transform.lease_ttl_secs", self.transform.lease_ttl_secs),
            ("schedule.watch_interval_secs", self.schedule.watch_interval_secs),
            ("schedule.tick_millis", self.schedule.tick_millis),
        ] {
            if value == 0 {
                return Err(invalid(key, "must be positive"));
            }
        }
        Ok(())
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            institution_id: self.api.institution_id.clone(),
            products: self.api.products.clone(),
            readiness_delay: Duration::from_secs(self.extract.readiness_delay_secs),
            readiness: PollSchedule::new(
                Duration::from_secs(self.extract.readiness_poll_secs),
                Duration::from_secs(self.extract.readiness_timeout_secs),
            ),
        }
    }

    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions {
            output_naming: self.transform.output_naming,
            settle: PollSchedule::new(
                Duration::from_millis(self.transform.settle_poll_ms),
                Duration::from_millis(self.transform.settle_timeout_ms),
            ),
            lease_ttl: Duration::from_secs(self.transform.lease_ttl_secs),
        }
    }

    pub fn schedule_options(&self) -> ScheduleOptions {
        ScheduleOptions {
            run_on_startup: self.schedule.run_on_startup,
            watch_interval: Duration::from_secs(self.schedule.watch_interval_secs),
            tick: Duration::from_millis(self.schedule.tick_millis),
        }
    }
}
