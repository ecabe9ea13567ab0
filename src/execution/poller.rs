//! Status Poller
//!
//! Submits a query and drives its `QueryExecution` to a terminal state with a
//! constant poll interval. Every wait and every in-flight status call races
//! the cancellation token; cancellation wins ties.

use crate::config::EngineConfig;
use crate::error::{AthenaError, Result};
use crate::execution::query_execution::QueryExecution;
use crate::execution::retry::{self, RetryPolicy};
use crate::execution::service::{QueryService, QueryState, SubmitRequest};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct StatusPoller {
    service: Arc<dyn QueryService>,
    poll_interval: Duration,
    retry: RetryPolicy,
    kill_on_interrupt: bool,
    timeout: Option<Duration>,
}

impl StatusPoller {
    pub fn new(service: Arc<dyn QueryService>, config: &EngineConfig) -> Self {
        Self {
            service,
            poll_interval: config.poll_interval(),
            retry: RetryPolicy::new(
                config.poll_interval(),
                config.retry_max_attempts,
                config.retry_max_duration(),
            ),
            kill_on_interrupt: config.kill_on_interrupt,
            timeout: config.query_timeout(),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Submit `sql` in the configured context. Rejections are never retried.
    pub async fn submit(&self, sql: &str, config: &EngineConfig) -> Result<QueryExecution> {
        let request = SubmitRequest {
            sql: sql.to_string(),
            database: config.database.clone(),
            catalog: config.catalog.clone(),
            work_group: config.work_group.clone(),
            output_location: config.output_location.clone(),
            client_request_token: Uuid::new_v4().to_string(),
        };

        let query_id = self
            .service
            .submit_query(&request)
            .await
            .map_err(|e| AthenaError::Submission(e.to_string()))?;

        info!("Submitted query {} to {}.{}", query_id, request.catalog, request.database);
        Ok(QueryExecution::new(query_id, request.sql, request.database, request.catalog))
    }

    /// Poll until the execution is terminal.
    ///
    /// Returns `Ok(())` only for SUCCEEDED. FAILED and exhausted retries raise
    /// `TerminalQuery`; an observed cancellation raises `Cancelled` without
    /// waiting for the service to confirm it.
    pub async fn poll_until_terminal(
        &self,
        execution: &mut QueryExecution,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let started = Instant::now();
        let mut failures = 0u32;
        let mut failing_since: Option<Instant> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(self.abort(execution).await);
            }

            if let Some(timeout) = self.timeout {
                if started.elapsed() >= timeout {
                    warn!("Query {} exceeded timeout of {:?}", execution.query_id, timeout);
                    self.request_cancel(&execution.query_id).await;
                    let message = format!("query timed out after {:?}", timeout);
                    execution.mark_failed(message.clone());
                    return Err(AthenaError::terminal(&execution.query_id, message));
                }
            }

            let checked = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.abort(execution).await),
                checked = self.service.get_query_status(&execution.query_id) => checked,
            };

            match checked {
                Ok(status) => {
                    failures = 0;
                    failing_since = None;
                    execution.apply_status(&status);
                    debug!(
                        "Query {} is {} ({} ms, {} bytes scanned)",
                        execution.query_id,
                        execution.state,
                        execution.elapsed_millis,
                        execution.data_scanned_bytes
                    );

                    if cancel.is_cancelled() {
                        return Err(self.abort(execution).await);
                    }

                    match execution.state {
                        QueryState::Succeeded => return Ok(()),
                        QueryState::Failed => {
                            let message = execution
                                .error_message
                                .clone()
                                .unwrap_or_else(|| "query failed without a reason".to_string());
                            return Err(AthenaError::terminal(&execution.query_id, message));
                        }
                        QueryState::Cancelled => {
                            return Err(AthenaError::Cancelled(execution.query_id.clone()));
                        }
                        QueryState::Queued | QueryState::Running => {}
                    }
                }
                Err(error) => {
                    failures += 1;
                    let since = *failing_since.get_or_insert_with(Instant::now);
                    let decision = retry::evaluate(&error, &execution.database, &execution.catalog);

                    if !decision.retry {
                        warn!("Query {} status check failed terminally: {}", execution.query_id, error);
                        execution.mark_failed(error.message.clone());
                        return Err(AthenaError::terminal(&execution.query_id, error.message));
                    }
                    if !self.retry.allows(failures, since) {
                        let message = format!("retry budget exhausted: {}", error.message);
                        warn!("Query {} {}", execution.query_id, message);
                        execution.mark_failed(message.clone());
                        return Err(AthenaError::terminal(&execution.query_id, message));
                    }
                    let transient = AthenaError::TransientService(error.message);
                    warn!(
                        "Query {} status check failed ({}/{}): {}",
                        execution.query_id, failures, self.retry.max_attempts, transient
                    );
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.abort(execution).await),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Best-effort remote cancel; failures are logged, not raised
    pub async fn request_cancel(&self, query_id: &str) {
        info!("Requesting cancellation of query {}", query_id);
        if let Err(e) = self.service.cancel_query(query_id).await {
            warn!("Cancel request for query {} failed: {}", query_id, e);
        }
    }

    async fn abort(&self, execution: &QueryExecution) -> AthenaError {
        if self.kill_on_interrupt {
            self.request_cancel(&execution.query_id).await;
        } else {
            info!("Query {} abandoned locally; remote cancel disabled", execution.query_id);
        }
        AthenaError::Cancelled(execution.query_id.clone())
    }
}
