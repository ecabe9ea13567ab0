//! Cursor - the stateful handle callers use to run a query and read its rows
//!
//! `execute` submits and polls until the query is terminal, picks a result
//! source from the execution metadata and prefetches the first page.
//! Rows are then cast lazily, one page at a time, as the caller pulls them.

use crate::config::{EngineConfig, ResultFormat};
use crate::error::{AthenaError, Result};
use crate::execution::{QueryExecution, QueryService, QueryState, StatusPoller};
use crate::results::{
    BulkFileResultSource, DirectResultSource, ObjectStorage, RawRow, ResultPage, ResultPager,
    ResultSource,
};
use crate::types::{ColumnDescriptor, NullSentinels, TypeCaster, TypedRow};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Idle,
    Executing,
    Consumable,
    Failed,
    Closed,
}

/// Shared entry point; every cursor gets its own execution state
#[derive(Clone)]
pub struct Connection {
    service: Arc<dyn QueryService>,
    storage: Option<Arc<dyn ObjectStorage>>,
    config: Arc<EngineConfig>,
    sentinels: NullSentinels,
}

impl Connection {
    pub fn new(service: Arc<dyn QueryService>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let sentinels = config.null_tokens.iter().cloned().collect();
        Ok(Self {
            service,
            storage: None,
            config: Arc::new(config),
            sentinels,
        })
    }

    /// Object storage used by the bulk-file result path
    pub fn with_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Replace the null sentinels (e.g. to add per-column NA markers)
    pub fn with_null_sentinels(mut self, sentinels: NullSentinels) -> Self {
        self.sentinels = sentinels;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cursor(&self) -> Cursor {
        Cursor {
            service: self.service.clone(),
            storage: self.storage.clone(),
            poller: StatusPoller::new(self.service.clone(), &self.config),
            config: self.config.clone(),
            caster: TypeCaster::new(self.sentinels.clone()),
            state: CursorState::Idle,
            execution: None,
            pager: None,
            buffer: VecDeque::new(),
            columns: Arc::new(Vec::new()),
            cancel: CancellationToken::new(),
            fetch_size: self.config.fetch_size,
        }
    }
}

pub struct Cursor {
    service: Arc<dyn QueryService>,
    storage: Option<Arc<dyn ObjectStorage>>,
    config: Arc<EngineConfig>,
    poller: StatusPoller,
    caster: TypeCaster,
    state: CursorState,
    execution: Option<QueryExecution>,
    pager: Option<ResultPager>,
    buffer: VecDeque<RawRow>,
    columns: Arc<Vec<ColumnDescriptor>>,
    cancel: CancellationToken,
    fetch_size: usize,
}

impl Cursor {
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Token that cancels the cursor's next or running `execute`.
    ///
    /// Once a cancellation has been observed the cursor switches to a fresh
    /// token, so take a new handle before the following `execute`.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn fetch_size(&self) -> usize {
        self.fetch_size
    }

    pub fn set_fetch_size(&mut self, size: usize) -> Result<()> {
        if size == 0 {
            return Err(AthenaError::Usage("fetch size must be positive".to_string()));
        }
        self.fetch_size = size;
        Ok(())
    }

    /// Run `sql` using the cursor's own cancellation token
    pub async fn execute(&mut self, sql: &str) -> Result<&mut Self> {
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        let cancel = self.cancel.clone();
        self.execute_with_cancel(sql, &cancel).await
    }

    /// Run `sql`, aborting when `cancel` fires
    pub async fn execute_with_cancel(&mut self, sql: &str, cancel: &CancellationToken) -> Result<&mut Self> {
        if self.state == CursorState::Closed {
            return Err(AthenaError::Usage("cursor is closed".to_string()));
        }
        self.reset();
        self.state = CursorState::Executing;

        match self.run(sql, cancel).await {
            Ok(()) => {
                self.state = CursorState::Consumable;
                Ok(self)
            }
            Err(e) => {
                self.state = CursorState::Failed;
                if self.cancel.is_cancelled() {
                    self.cancel = CancellationToken::new();
                }
                Err(e)
            }
        }
    }

    async fn run(&mut self, sql: &str, cancel: &CancellationToken) -> Result<()> {
        let mut execution = self.poller.submit(sql, &self.config).await?;
        let outcome = self.poller.poll_until_terminal(&mut execution, cancel).await;
        self.execution = Some(execution);
        outcome?;

        let source = self.select_source(cancel).await?;
        info!(
            "Reading results of query {} via {}",
            self.query_id().unwrap_or_default(),
            source.name()
        );
        let mut pager = ResultPager::new(source);
        if let Some(page) = pager.next_page().await? {
            self.record_update_count(&page);
            self.columns = page.columns().clone();
            self.buffer.extend(page.into_rows());
        }
        self.pager = Some(pager);
        Ok(())
    }

    async fn select_source(&self, cancel: &CancellationToken) -> Result<ResultSource> {
        let execution = self
            .execution
            .as_ref()
            .ok_or_else(|| AthenaError::Usage("no execution to read results from".to_string()))?;
        let retry = self.poller.retry_policy().clone();

        if self.config.result_format == ResultFormat::BulkFile {
            match (&execution.result_location, &self.storage) {
                (Some(location), Some(storage)) => {
                    let source = BulkFileResultSource::open(
                        self.service.clone(),
                        storage.clone(),
                        location.clone(),
                        execution.query_id.clone(),
                        execution.database.clone(),
                        execution.catalog.clone(),
                        self.config.max_rows_per_page,
                        retry,
                        cancel.clone(),
                    )
                    .await?;
                    return Ok(ResultSource::BulkFile(source));
                }
                (None, _) => warn!(
                    "Query {} has no result location; reading results through the API",
                    execution.query_id
                ),
                (_, None) => warn!(
                    "No object storage configured; reading results of query {} through the API",
                    execution.query_id
                ),
            }
        }

        Ok(ResultSource::Direct(DirectResultSource::new(
            self.service.clone(),
            execution.query_id.clone(),
            execution.database.clone(),
            execution.catalog.clone(),
            self.config.max_rows_per_page,
            retry,
            cancel.clone(),
        )))
    }

    fn record_update_count(&mut self, page: &ResultPage) {
        if let (Some(count), Some(execution)) = (page.update_count(), self.execution.as_mut()) {
            execution.record_update_count(count);
        }
    }

    fn reset(&mut self) {
        self.execution = None;
        self.pager = None;
        self.buffer.clear();
        self.columns = Arc::new(Vec::new());
    }

    fn ensure_consumable(&self) -> Result<()> {
        match self.state {
            CursorState::Consumable => Ok(()),
            CursorState::Idle => Err(AthenaError::Usage("no query has been executed".to_string())),
            CursorState::Executing => Err(AthenaError::Usage("query is still executing".to_string())),
            CursorState::Failed => Err(AthenaError::Usage(
                "the last execution failed; no rows are available".to_string(),
            )),
            CursorState::Closed => Err(AthenaError::Usage("cursor is closed".to_string())),
        }
    }

    /// Pull the next page into the buffer; false once the results are exhausted
    async fn load_next_page(&mut self) -> Result<bool> {
        let pager = match self.pager.as_mut() {
            Some(pager) => pager,
            None => return Ok(false),
        };
        match pager.next_page().await {
            Ok(Some(page)) => {
                self.record_update_count(&page);
                if !page.columns().is_empty() {
                    self.columns = page.columns().clone();
                }
                self.buffer.extend(page.into_rows());
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => {
                self.state = CursorState::Failed;
                Err(e)
            }
        }
    }

    pub async fn fetch_one(&mut self) -> Result<Option<TypedRow>> {
        self.ensure_consumable()?;
        loop {
            if let Some(raw) = self.buffer.pop_front() {
                return match self.caster.cast_row(&self.columns, &raw) {
                    Ok(row) => Ok(Some(row)),
                    Err(e) => {
                        self.state = CursorState::Failed;
                        Err(e)
                    }
                };
            }
            if !self.load_next_page().await? {
                return Ok(None);
            }
        }
    }

    /// Up to `size` rows (default: the fetch size)
    pub async fn fetch_many(&mut self, size: Option<usize>) -> Result<Vec<TypedRow>> {
        let size = size.unwrap_or(self.fetch_size);
        self.ensure_consumable()?;
        let mut rows = Vec::with_capacity(size.min(self.buffer.len().max(1)));
        while rows.len() < size {
            match self.fetch_one().await? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    /// All remaining rows
    pub async fn fetch_all(&mut self) -> Result<Vec<TypedRow>> {
        self.ensure_consumable()?;
        let mut rows = Vec::new();
        while let Some(row) = self.fetch_one().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Ask the service to stop the current query (best effort)
    pub async fn cancel(&self) -> Result<()> {
        let query_id = self
            .query_id()
            .ok_or_else(|| AthenaError::Usage("no query to cancel".to_string()))?;
        self.poller.request_cancel(query_id).await;
        Ok(())
    }

    pub fn close(&mut self) {
        self.reset();
        self.state = CursorState::Closed;
    }

    pub fn description(&self) -> Option<&[ColumnDescriptor]> {
        match self.state {
            CursorState::Consumable => Some(self.columns.as_slice()),
            _ => None,
        }
    }

    pub fn execution(&self) -> Option<&QueryExecution> {
        self.execution.as_ref()
    }

    pub fn query_id(&self) -> Option<&str> {
        self.execution.as_ref().map(|e| e.query_id.as_str())
    }

    pub fn query_state(&self) -> Option<QueryState> {
        self.execution.as_ref().map(|e| e.state)
    }

    pub fn state_change_reason(&self) -> Option<&str> {
        self.execution.as_ref().and_then(|e| e.error_message.as_deref())
    }

    pub fn output_location(&self) -> Option<&str> {
        self.execution
            .as_ref()
            .and_then(|e| e.result_location.as_ref())
            .map(|l| l.uri.as_str())
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.execution.as_ref().map(|e| e.submitted_at)
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.execution.as_ref().and_then(|e| e.completed_at)
    }

    /// Rows affected as reported by the service (DML / CTAS)
    pub fn row_count(&self) -> Option<u64> {
        self.counters().and_then(|e| e.update_count)
    }

    pub fn data_scanned_bytes(&self) -> Option<u64> {
        self.counters().map(|e| e.data_scanned_bytes)
    }

    pub fn execution_time(&self) -> Option<Duration> {
        self.counters().map(|e| e.elapsed())
    }

    fn counters(&self) -> Option<&QueryExecution> {
        if self.config.report_counters {
            self.execution.as_ref()
        } else {
            None
        }
    }
}
