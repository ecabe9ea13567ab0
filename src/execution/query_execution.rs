//! Query Execution - the record of one submitted query

use crate::execution::service::{QueryState, QueryStatus, ResultLocation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryExecution {
    pub query_id: String,
    pub sql: String,
    pub database: String,
    pub catalog: String,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub state: QueryState,
    pub result_location: Option<ResultLocation>,
    pub error_message: Option<String>,
    pub elapsed_millis: u64,
    pub data_scanned_bytes: u64,
    pub update_count: Option<u64>,
}

impl QueryExecution {
    pub fn new(
        query_id: impl Into<String>,
        sql: impl Into<String>,
        database: impl Into<String>,
        catalog: impl Into<String>,
    ) -> Self {
        Self {
            query_id: query_id.into(),
            sql: sql.into(),
            database: database.into(),
            catalog: catalog.into(),
            submitted_at: Utc::now(),
            completed_at: None,
            state: QueryState::Queued,
            result_location: None,
            error_message: None,
            elapsed_millis: 0,
            data_scanned_bytes: 0,
            update_count: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_millis)
    }

    /// Fold a status snapshot into the record.
    ///
    /// Counters only move forward. Once terminal the record is frozen, except
    /// that a result location may still be filled in.
    pub fn apply_status(&mut self, status: &QueryStatus) {
        if self.is_terminal() {
            if self.result_location.is_none() {
                self.result_location = status.result_location.clone();
            }
            return;
        }

        if status.state != self.state {
            info!("Query {} {} -> {}", self.query_id, self.state, status.state);
            self.state = status.state;
        }
        if let Some(elapsed) = status.elapsed_millis {
            self.elapsed_millis = self.elapsed_millis.max(elapsed);
        }
        if let Some(bytes) = status.bytes_scanned {
            self.data_scanned_bytes = self.data_scanned_bytes.max(bytes);
        }
        if let Some(count) = status.update_count {
            self.update_count = Some(self.update_count.map_or(count, |c| c.max(count)));
        }
        if status.result_location.is_some() {
            self.result_location = status.result_location.clone();
        }
        if status.error_message.is_some() {
            self.error_message = status.error_message.clone();
        }
        if self.is_terminal() {
            self.completed_at = Some(status.completed_at.unwrap_or_else(Utc::now));
        }
    }

    /// Rows affected as reported alongside the results; accepted after terminal
    pub fn record_update_count(&mut self, count: u64) {
        self.update_count = Some(self.update_count.map_or(count, |c| c.max(count)));
    }

    /// Record a locally decided failure (non-retryable status check, budget exhausted)
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        info!("Query {} {} -> {}", self.query_id, self.state, QueryState::Failed);
        self.state = QueryState::Failed;
        self.error_message = Some(message.into());
        self.completed_at = Some(Utc::now());
    }
}
