//! Scripted service and storage doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use athena_query::execution::{
    QueryService, QueryState, QueryStatus, ResultLocation, ResultsResponse, ServiceError,
    ServiceResult, SubmitRequest,
};
use athena_query::results::{ObjectReader, ObjectStorage};
use athena_query::{ColumnDescriptor, EngineConfig};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default().with_poll_interval(Duration::from_millis(1));
    config.retry_max_duration_ms = 5_000;
    config
}

pub fn columns(defs: &[(&str, &str)]) -> Vec<ColumnDescriptor> {
    defs.iter()
        .map(|(name, wire_type)| ColumnDescriptor::new(*name, *wire_type))
        .collect()
}

pub fn row(cells: &[&str]) -> Vec<Option<String>> {
    cells.iter().map(|c| Some(c.to_string())).collect()
}

pub fn status(state: QueryState) -> QueryStatus {
    QueryStatus::new(state)
}

pub fn succeeded() -> QueryStatus {
    QueryStatus::new(QueryState::Succeeded)
}

pub fn succeeded_at(location: ResultLocation) -> QueryStatus {
    let mut status = QueryStatus::new(QueryState::Succeeded);
    status.result_location = Some(location);
    status
}

#[derive(Default)]
struct MockState {
    submissions: Vec<SubmitRequest>,
    submit_error: Option<ServiceError>,
    cancel_on_submit: Option<CancellationToken>,
    cancel_on_status: Option<CancellationToken>,
    statuses: VecDeque<ServiceResult<QueryStatus>>,
    last_status: Option<QueryStatus>,
    status_calls: usize,
    pages: HashMap<Option<String>, ResultsResponse>,
    results_errors: VecDeque<ServiceError>,
    results_calls: Vec<(Option<String>, usize)>,
    cancel_calls: Vec<String>,
    schema: Vec<ColumnDescriptor>,
    schema_calls: Vec<(String, String)>,
}

/// In-memory `QueryService` replaying a scripted status sequence
pub struct MockQueryService {
    query_id: String,
    state: Mutex<MockState>,
}

impl MockQueryService {
    pub fn new(query_id: &str) -> Self {
        Self {
            query_id: query_id.to_string(),
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_statuses(self, statuses: Vec<QueryStatus>) -> Self {
        self.state
            .lock()
            .unwrap()
            .statuses
            .extend(statuses.into_iter().map(Ok));
        self
    }

    pub fn with_status_error(self, error: ServiceError) -> Self {
        self.state.lock().unwrap().statuses.push_back(Err(error));
        self
    }

    /// Serve `response` for the page addressed by `token`
    pub fn with_page(self, token: Option<&str>, response: ResultsResponse) -> Self {
        self.state
            .lock()
            .unwrap()
            .pages
            .insert(token.map(str::to_string), response);
        self
    }

    pub fn with_results_error(self, error: ServiceError) -> Self {
        self.state.lock().unwrap().results_errors.push_back(error);
        self
    }

    pub fn with_submit_error(self, error: ServiceError) -> Self {
        self.state.lock().unwrap().submit_error = Some(error);
        self
    }

    /// Fire `token` as soon as the query has been accepted
    pub fn cancel_on_submit(self, token: CancellationToken) -> Self {
        self.state.lock().unwrap().cancel_on_submit = Some(token);
        self
    }

    /// Fire `token` during the next status check, before its answer is returned
    pub fn cancel_on_status(self, token: CancellationToken) -> Self {
        self.state.lock().unwrap().cancel_on_status = Some(token);
        self
    }

    pub fn with_schema(self, schema: Vec<ColumnDescriptor>) -> Self {
        self.state.lock().unwrap().schema = schema;
        self
    }

    pub fn submissions(&self) -> Vec<SubmitRequest> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn status_calls(&self) -> usize {
        self.state.lock().unwrap().status_calls
    }

    pub fn results_calls(&self) -> Vec<(Option<String>, usize)> {
        self.state.lock().unwrap().results_calls.clone()
    }

    pub fn cancel_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().cancel_calls.clone()
    }

    pub fn schema_calls(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().schema_calls.clone()
    }
}

#[async_trait]
impl QueryService for MockQueryService {
    async fn submit_query(&self, request: &SubmitRequest) -> ServiceResult<String> {
        let mut state = self.state.lock().unwrap();
        state.submissions.push(request.clone());
        if let Some(error) = state.submit_error.clone() {
            return Err(error);
        }
        if let Some(token) = &state.cancel_on_submit {
            token.cancel();
        }
        Ok(self.query_id.clone())
    }

    async fn get_query_status(&self, _query_id: &str) -> ServiceResult<QueryStatus> {
        let mut state = self.state.lock().unwrap();
        state.status_calls += 1;
        if let Some(token) = state.cancel_on_status.take() {
            token.cancel();
        }
        match state.statuses.pop_front() {
            Some(Ok(status)) => {
                state.last_status = Some(status.clone());
                Ok(status)
            }
            Some(Err(error)) => Err(error),
            None => Ok(state
                .last_status
                .clone()
                .unwrap_or_else(|| QueryStatus::new(QueryState::Running))),
        }
    }

    async fn get_query_results(
        &self,
        _query_id: &str,
        next_token: Option<&str>,
        max_rows: usize,
    ) -> ServiceResult<ResultsResponse> {
        let mut state = self.state.lock().unwrap();
        state
            .results_calls
            .push((next_token.map(str::to_string), max_rows));
        if let Some(error) = state.results_errors.pop_front() {
            return Err(error);
        }
        state
            .pages
            .get(&next_token.map(str::to_string))
            .cloned()
            .ok_or_else(|| ServiceError::programming(format!("unknown token {:?}", next_token)))
    }

    async fn cancel_query(&self, query_id: &str) -> ServiceResult<()> {
        self.state
            .lock()
            .unwrap()
            .cancel_calls
            .push(query_id.to_string());
        Ok(())
    }

    async fn get_table_schema(
        &self,
        database: &str,
        table: &str,
    ) -> ServiceResult<Vec<ColumnDescriptor>> {
        let mut state = self.state.lock().unwrap();
        state
            .schema_calls
            .push((database.to_string(), table.to_string()));
        Ok(state.schema.clone())
    }
}

/// Object storage backed by a map of URI to bytes
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    reads: Mutex<Vec<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, uri: &str, body: &str) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert(uri.to_string(), body.as_bytes().to_vec());
        self
    }

    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn get_object(&self, location: &str) -> ServiceResult<ObjectReader> {
        self.reads.lock().unwrap().push(location.to_string());
        let body = self
            .objects
            .lock()
            .unwrap()
            .get(location)
            .cloned()
            .ok_or_else(|| ServiceError::programming(format!("no such object: {}", location)))?;
        Ok(Box::new(std::io::Cursor::new(body)))
    }
}
