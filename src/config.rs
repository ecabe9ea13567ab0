//! Engine configuration
//!
//! Values are handed to the engine by the caller; `from_env` is a convenience
//! for binaries and tests that keep settings in `ATHENA_*` variables.

use crate::error::{AthenaError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How result rows are retrieved once a query succeeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultFormat {
    /// Page through the service's GetQueryResults API
    DirectApi,
    /// Stream the result file the service wrote to object storage
    BulkFile,
}

impl std::str::FromStr for ResultFormat {
    type Err = AthenaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct_api" | "direct" | "api" => Ok(ResultFormat::DirectApi),
            "bulk_file" | "bulk" | "file" | "csv" => Ok(ResultFormat::BulkFile),
            other => Err(AthenaError::Config(format!("unknown result format '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Database (schema) the query runs against
    pub database: String,

    /// Catalog / data source the query runs against
    pub catalog: String,

    pub work_group: Option<String>,

    /// Where the service should write result files
    pub output_location: Option<String>,

    /// Interval between status checks, also used as the retry backoff
    pub poll_interval_ms: u64,

    /// Send a cancel request to the service when the cancellation token fires
    pub kill_on_interrupt: bool,

    pub result_format: ResultFormat,

    /// Expose row/byte/elapsed counters on the cursor
    pub report_counters: bool,

    pub max_rows_per_page: usize,

    /// Default size for `fetch_many`
    pub fetch_size: usize,

    pub retry_max_attempts: u32,

    pub retry_max_duration_ms: u64,

    /// Overall polling deadline (None = wait indefinitely)
    pub query_timeout_ms: Option<u64>,

    /// Tokens treated as null in every column
    pub null_tokens: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: "default".to_string(),
            catalog: "AwsDataCatalog".to_string(),
            work_group: None,
            output_location: None,
            poll_interval_ms: 1000,
            kill_on_interrupt: true,
            result_format: ResultFormat::DirectApi,
            report_counters: true,
            max_rows_per_page: 1000,
            fetch_size: 1000,
            retry_max_attempts: 10,
            retry_max_duration_ms: 300_000,
            query_timeout_ms: None,
            null_tokens: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables (and `.env` if present)
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(database) = lookup("ATHENA_DATABASE") {
            config.database = database;
        }
        if let Some(catalog) = lookup("ATHENA_CATALOG") {
            config.catalog = catalog;
        }
        config.work_group = lookup("ATHENA_WORK_GROUP").or(config.work_group);
        config.output_location = lookup("ATHENA_OUTPUT_LOCATION").or(config.output_location);

        if let Some(raw) = lookup("ATHENA_POLL_INTERVAL") {
            config.poll_interval_ms = parse_seconds_as_millis("ATHENA_POLL_INTERVAL", &raw)?;
        }
        if let Some(raw) = lookup("ATHENA_KILL_ON_INTERRUPT") {
            config.kill_on_interrupt = parse_bool("ATHENA_KILL_ON_INTERRUPT", &raw)?;
        }
        if let Some(raw) = lookup("ATHENA_RESULT_FORMAT") {
            config.result_format = raw.parse()?;
        }
        if let Some(raw) = lookup("ATHENA_REPORT_COUNTERS") {
            config.report_counters = parse_bool("ATHENA_REPORT_COUNTERS", &raw)?;
        }
        if let Some(raw) = lookup("ATHENA_MAX_ROWS_PER_PAGE") {
            config.max_rows_per_page = parse_number("ATHENA_MAX_ROWS_PER_PAGE", &raw)?;
        }
        if let Some(raw) = lookup("ATHENA_FETCH_SIZE") {
            config.fetch_size = parse_number("ATHENA_FETCH_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("ATHENA_QUERY_TIMEOUT") {
            config.query_timeout_ms = Some(parse_seconds_as_millis("ATHENA_QUERY_TIMEOUT", &raw)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(AthenaError::Config("poll interval must be positive".to_string()));
        }
        if self.max_rows_per_page == 0 {
            return Err(AthenaError::Config("max_rows_per_page must be positive".to_string()));
        }
        if self.fetch_size == 0 {
            return Err(AthenaError::Config("fetch_size must be positive".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_max_duration(&self) -> Duration {
        Duration::from_millis(self.retry_max_duration_ms)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis().max(1) as u64;
        self
    }

    pub fn with_result_format(mut self, format: ResultFormat) -> Self {
        self.result_format = format;
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = catalog.into();
        self
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(AthenaError::Config(format!("{}: expected a boolean, got '{}'", key, other))),
    }
}

fn parse_number(key: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse()
        .map_err(|_| AthenaError::Config(format!("{}: expected an integer, got '{}'", key, raw)))
}

fn parse_seconds_as_millis(key: &str, raw: &str) -> Result<u64> {
    let seconds: f64 = raw
        .trim()
        .parse()
        .map_err(|_| AthenaError::Config(format!("{}: expected seconds, got '{}'", key, raw)))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(AthenaError::Config(format!("{}: expected seconds, got '{}'", key, raw)));
    }
    Ok((seconds * 1000.0).round() as u64)
}
