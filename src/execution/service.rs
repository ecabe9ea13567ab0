//! Query Service Trait - contract for the remote query service
//!
//! The engine only depends on this trait; `crate::service::AthenaHttpService`
//! is the HTTP adapter, tests use scripted in-memory fakes.

use crate::types::ColumnDescriptor;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure class reported by a remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceErrorKind {
    /// Infrastructure or metadata failure; may be transient
    Operational,
    /// Malformed request, syntax error, permission problem; never transient
    Programming,
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceErrorKind::Operational => write!(f, "OperationalError"),
            ServiceErrorKind::Programming => write!(f, "ProgrammingError"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn operational(message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::Operational,
            message: message.into(),
        }
    }

    pub fn programming(message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::Programming,
            message: message.into(),
        }
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Remote lifecycle state of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl QueryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryState::Succeeded | QueryState::Failed | QueryState::Cancelled
        )
    }
}

impl std::str::FromStr for QueryState {
    type Err = ServiceError;

    fn from_str(s: &str) -> ServiceResult<Self> {
        match s {
            "QUEUED" => Ok(QueryState::Queued),
            "RUNNING" => Ok(QueryState::Running),
            "SUCCEEDED" => Ok(QueryState::Succeeded),
            "FAILED" => Ok(QueryState::Failed),
            "CANCELLED" => Ok(QueryState::Cancelled),
            other => Err(ServiceError::operational(format!("unknown query state '{}'", other))),
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryState::Queued => "QUEUED",
            QueryState::Running => "RUNNING",
            QueryState::Succeeded => "SUCCEEDED",
            QueryState::Failed => "FAILED",
            QueryState::Cancelled => "CANCELLED",
        };
        write!(f, "{}", name)
    }
}

/// Delimited layout of a server-written result file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultFileFormat {
    /// Comma separated with a header record
    Csv,
    /// Tab separated, no header (DDL and utility statements)
    Tsv,
}

impl ResultFileFormat {
    /// Infer the layout from an object key's extension
    pub fn from_location(location: &str) -> Self {
        if location.ends_with(".txt") || location.ends_with(".tsv") {
            ResultFileFormat::Tsv
        } else {
            ResultFileFormat::Csv
        }
    }

    pub fn delimiter(&self) -> u8 {
        match self {
            ResultFileFormat::Csv => b',',
            ResultFileFormat::Tsv => b'\t',
        }
    }

    pub fn has_header(&self) -> bool {
        matches!(self, ResultFileFormat::Csv)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub database: String,
    pub table: String,
}

/// Where the service wrote a query's results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultLocation {
    pub uri: String,
    pub format: ResultFileFormat,
    /// Schema entry describing the file's columns, when the service exposes one
    pub table: Option<TableRef>,
}

impl ResultLocation {
    pub fn new(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        Self {
            format: ResultFileFormat::from_location(&uri),
            uri,
            table: None,
        }
    }

    pub fn with_table(mut self, database: impl Into<String>, table: impl Into<String>) -> Self {
        self.table = Some(TableRef {
            database: database.into(),
            table: table.into(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub sql: String,
    pub database: String,
    pub catalog: String,
    pub work_group: Option<String>,
    pub output_location: Option<String>,
    /// Idempotency token, fresh per submission
    pub client_request_token: String,
}

/// Snapshot returned by a status check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryStatus {
    pub state: QueryState,
    pub elapsed_millis: Option<u64>,
    pub bytes_scanned: Option<u64>,
    pub result_location: Option<ResultLocation>,
    pub error_message: Option<String>,
    /// Rows affected for DML / CTAS statements
    pub update_count: Option<u64>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueryStatus {
    pub fn new(state: QueryState) -> Self {
        Self {
            state,
            elapsed_millis: None,
            bytes_scanned: None,
            result_location: None,
            error_message: None,
            update_count: None,
            completed_at: None,
        }
    }
}

/// One page from the direct results API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsResponse {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Vec<Option<String>>>,
    pub next_token: Option<String>,
    /// Rows affected, reported by the results call for DML / CTAS statements
    #[serde(default)]
    pub update_count: Option<u64>,
}

/// Remote query service
#[async_trait]
pub trait QueryService: Send + Sync {
    async fn submit_query(&self, request: &SubmitRequest) -> ServiceResult<String>;

    async fn get_query_status(&self, query_id: &str) -> ServiceResult<QueryStatus>;

    async fn get_query_results(
        &self,
        query_id: &str,
        next_token: Option<&str>,
        max_rows: usize,
    ) -> ServiceResult<ResultsResponse>;

    /// Fire-and-forget; the query may still finish before the cancel lands
    async fn cancel_query(&self, query_id: &str) -> ServiceResult<()>;

    async fn get_table_schema(
        &self,
        database: &str,
        table: &str,
    ) -> ServiceResult<Vec<ColumnDescriptor>>;
}
