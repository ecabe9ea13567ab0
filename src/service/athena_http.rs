//! Athena JSON-protocol client
//!
//! Speaks the service's JSON 1.1 protocol over HTTPS:
//! - POST / with `X-Amz-Target: AmazonAthena.<Operation>`
//! - Body and response are JSON with PascalCase members
//!
//! Requests are not signed here. Point the endpoint at a signing proxy or add
//! pre-computed auth headers with `with_header`.

use crate::execution::service::{
    QueryService, QueryState, QueryStatus, ResultLocation, ResultsResponse, ServiceError,
    ServiceResult, SubmitRequest,
};
use crate::types::{ColumnDescriptor, TypeFamily};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Largest page GetQueryResults will return
pub const MAX_RESULTS_PER_PAGE: usize = 1000;

const JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.1";

pub struct AthenaHttpService {
    client: Client,
    endpoint: String,
    headers: HeaderMap,
    catalog: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StartQueryExecutionInput<'a> {
    query_string: &'a str,
    client_request_token: &'a str,
    query_execution_context: QueryExecutionContext<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result_configuration: Option<ResultConfigurationInput<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    work_group: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecutionContext<'a> {
    database: &'a str,
    catalog: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ResultConfigurationInput<'a> {
    output_location: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StartQueryExecutionOutput {
    query_execution_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecutionIdInput<'a> {
    query_execution_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueryExecutionOutput {
    query_execution: QueryExecutionRecord,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecutionRecord {
    status: ExecutionStatus,
    #[serde(default)]
    statistics: Option<ExecutionStatistics>,
    #[serde(default)]
    result_configuration: Option<ResultConfigurationOutput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExecutionStatus {
    state: String,
    #[serde(default)]
    state_change_reason: Option<String>,
    /// Epoch seconds
    #[serde(default)]
    completion_date_time: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExecutionStatistics {
    #[serde(default)]
    total_execution_time_in_millis: Option<u64>,
    #[serde(default)]
    engine_execution_time_in_millis: Option<u64>,
    #[serde(default)]
    data_scanned_in_bytes: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResultConfigurationOutput {
    #[serde(default)]
    output_location: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueryResultsInput<'a> {
    query_execution_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueryResultsOutput {
    result_set: ResultSet,
    #[serde(default)]
    next_token: Option<String>,
    #[serde(default)]
    update_count: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResultSet {
    #[serde(default)]
    rows: Vec<WireRow>,
    #[serde(default)]
    result_set_metadata: Option<ResultSetMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireRow {
    #[serde(default)]
    data: Vec<WireDatum>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireDatum {
    #[serde(default)]
    var_char_value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResultSetMetadata {
    #[serde(default)]
    column_info: Vec<WireColumnInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireColumnInfo {
    name: String,
    #[serde(rename = "Type")]
    column_type: String,
    #[serde(default)]
    precision: Option<u32>,
    #[serde(default)]
    scale: Option<u32>,
    #[serde(default)]
    nullable: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetTableMetadataInput<'a> {
    catalog_name: &'a str,
    database_name: &'a str,
    table_name: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetTableMetadataOutput {
    table_metadata: TableMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TableMetadata {
    #[serde(default)]
    columns: Vec<WireTableColumn>,
    #[serde(default)]
    partition_keys: Vec<WireTableColumn>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireTableColumn {
    name: String,
    #[serde(rename = "Type", default)]
    column_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    error_type: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

impl AthenaHttpService {
    /// Create a client for `endpoint` (e.g. "https://athena.us-east-1.amazonaws.com")
    pub fn new(endpoint: impl Into<String>, catalog: impl Into<String>) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(10))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| ServiceError::programming(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            headers: HeaderMap::new(),
            catalog: catalog.into(),
        })
    }

    /// Create a client from `ATHENA_ENDPOINT` / `ATHENA_REGION` / `ATHENA_CATALOG`
    pub fn from_env() -> ServiceResult<Self> {
        dotenv::dotenv().ok();
        let region = std::env::var("ATHENA_REGION").unwrap_or_else(|_| "us-east-1".to_string());
        let endpoint = std::env::var("ATHENA_ENDPOINT")
            .unwrap_or_else(|_| format!("https://athena.{}.amazonaws.com", region));
        let catalog = std::env::var("ATHENA_CATALOG").unwrap_or_else(|_| "AwsDataCatalog".to_string());
        Self::new(endpoint, catalog)
    }

    /// Send an extra header with every request
    pub fn with_header(mut self, name: &str, value: &str) -> ServiceResult<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ServiceError::programming(format!("invalid header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ServiceError::programming(format!("invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    async fn call<I, O>(&self, operation: &str, input: &I) -> ServiceResult<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let body = serde_json::to_vec(input)
            .map_err(|e| ServiceError::programming(format!("cannot encode {} request: {}", operation, e)))?;

        debug!("Calling {} on {}", operation, self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .header("X-Amz-Target", format!("AmazonAthena.{}", operation))
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| ServiceError::operational(format!("{} request failed: {}", operation, e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let error = classify_error(status, &text);
            warn!("{} failed with status {}: {}", operation, status, error.message);
            return Err(error);
        }

        response
            .json::<O>()
            .await
            .map_err(|e| ServiceError::operational(format!("cannot decode {} response: {}", operation, e)))
    }
}

/// Map an error response onto the engine's error classes
fn classify_error(status: StatusCode, body: &str) -> ServiceError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let error_type = parsed
        .error_type
        .as_deref()
        .map(|t| t.rsplit('#').next().unwrap_or(t).to_string())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    let message = match parsed.message {
        Some(message) => format!("{}: {}", error_type, message),
        None if body.is_empty() => error_type.clone(),
        None => format!("{}: {}", error_type, body),
    };

    if error_type == "InvalidRequestException" {
        ServiceError::programming(message)
    } else {
        ServiceError::operational(message)
    }
}

fn epoch_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt((seconds * 1000.0).round() as i64).single()
}

fn status_from_record(record: QueryExecutionRecord) -> ServiceResult<QueryStatus> {
    let state: QueryState = record.status.state.parse()?;
    let statistics = record.statistics;

    Ok(QueryStatus {
        state,
        elapsed_millis: statistics.as_ref().and_then(|s| {
            s.total_execution_time_in_millis
                .or(s.engine_execution_time_in_millis)
        }),
        bytes_scanned: statistics.as_ref().and_then(|s| s.data_scanned_in_bytes),
        result_location: record
            .result_configuration
            .and_then(|c| c.output_location)
            .map(ResultLocation::new),
        error_message: record.status.state_change_reason,
        update_count: None,
        completed_at: record.status.completion_date_time.and_then(epoch_seconds),
    })
}

fn results_from_output(output: GetQueryResultsOutput) -> ResultsResponse {
    let columns = output
        .result_set
        .result_set_metadata
        .map(|m| m.column_info)
        .unwrap_or_default()
        .into_iter()
        .map(|info| {
            let mut column = ColumnDescriptor::new(info.name, info.column_type);
            // Precision and scale only carry meaning for decimals
            if matches!(column.family(), TypeFamily::Decimal { .. }) {
                column.precision = column.precision.or(info.precision);
                column.scale = column.scale.or(info.scale);
            }
            column.nullable = info.nullable.as_deref() != Some("NOT_NULL");
            column
        })
        .collect();

    let rows = output
        .result_set
        .rows
        .into_iter()
        .map(|row| row.data.into_iter().map(|d| d.var_char_value).collect())
        .collect();

    ResultsResponse {
        columns,
        rows,
        next_token: output.next_token,
        update_count: output.update_count,
    }
}

#[async_trait]
impl QueryService for AthenaHttpService {
    async fn submit_query(&self, request: &SubmitRequest) -> ServiceResult<String> {
        let input = StartQueryExecutionInput {
            query_string: &request.sql,
            client_request_token: &request.client_request_token,
            query_execution_context: QueryExecutionContext {
                database: &request.database,
                catalog: &request.catalog,
            },
            result_configuration: request
                .output_location
                .as_deref()
                .map(|output_location| ResultConfigurationInput { output_location }),
            work_group: request.work_group.as_deref(),
        };
        let output: StartQueryExecutionOutput = self.call("StartQueryExecution", &input).await?;
        Ok(output.query_execution_id)
    }

    async fn get_query_status(&self, query_id: &str) -> ServiceResult<QueryStatus> {
        let input = QueryExecutionIdInput {
            query_execution_id: query_id,
        };
        let output: GetQueryExecutionOutput = self.call("GetQueryExecution", &input).await?;
        status_from_record(output.query_execution)
    }

    async fn get_query_results(
        &self,
        query_id: &str,
        next_token: Option<&str>,
        max_rows: usize,
    ) -> ServiceResult<ResultsResponse> {
        let input = GetQueryResultsInput {
            query_execution_id: query_id,
            next_token,
            max_results: max_rows.clamp(1, MAX_RESULTS_PER_PAGE),
        };
        let output: GetQueryResultsOutput = self.call("GetQueryResults", &input).await?;
        Ok(results_from_output(output))
    }

    async fn cancel_query(&self, query_id: &str) -> ServiceResult<()> {
        let input = QueryExecutionIdInput {
            query_execution_id: query_id,
        };
        let _: serde_json::Value = self.call("StopQueryExecution", &input).await?;
        Ok(())
    }

    async fn get_table_schema(
        &self,
        database: &str,
        table: &str,
    ) -> ServiceResult<Vec<ColumnDescriptor>> {
        let input = GetTableMetadataInput {
            catalog_name: &self.catalog,
            database_name: database,
            table_name: table,
        };
        let output: GetTableMetadataOutput = self.call("GetTableMetadata", &input).await?;
        let metadata = output.table_metadata;

        Ok(metadata
            .columns
            .into_iter()
            .chain(metadata.partition_keys)
            .map(|c| ColumnDescriptor::new(c.name, c.column_type.unwrap_or_else(|| "string".to_string())))
            .collect())
    }
}
