//! Retry Policy
//!
//! Classifies remote failures as transient or terminal and drives the bounded,
//! constant-interval retry loop used for status checks, page fetches and
//! object downloads.
//!
//! The service can report "not found" for objects that were created moments
//! ago. A missing name that matches what this query asked for will never
//! appear, so it is terminal; any other missing name is treated as metadata
//! lag and retried.

use crate::error::{AthenaError, Result};
use crate::execution::service::{ServiceError, ServiceErrorKind, ServiceResult};
use lazy_static::lazy_static;
use regex::Regex;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

lazy_static! {
    static ref CATALOG_NOT_FOUND: Regex =
        Regex::new(r"\b(?:Catalog|Data\s*[Ss]ource)\s+'?(?P<name>[^\s']+)'?\s+not\s+found")
            .expect("valid catalog pattern");
    static ref DATABASE_NOT_FOUND: Regex =
        Regex::new(r"\b(?:Database|Namespace|Schema)\s+'?(?P<name>[^\s']+)'?\s+not\s+found")
            .expect("valid database pattern");
    static ref TABLE_NOT_FOUND: Regex =
        Regex::new(r"\bTable\s+'?(?P<name>[^\s']+)'?\s+not\s+found")
            .expect("valid table pattern");
}

/// Object kind named by a "not found" message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingObject {
    Catalog(String),
    Database(String),
    Table(String),
}

impl MissingObject {
    /// Match a message against the known "not found" templates
    pub fn from_message(message: &str) -> Option<Self> {
        let capture = |pattern: &Regex| {
            pattern
                .captures(message)
                .and_then(|c| c.name("name"))
                .map(|m| m.as_str().to_string())
        };

        if let Some(name) = capture(&CATALOG_NOT_FOUND) {
            return Some(MissingObject::Catalog(name));
        }
        if let Some(name) = capture(&DATABASE_NOT_FOUND) {
            return Some(MissingObject::Database(name));
        }
        capture(&TABLE_NOT_FOUND).map(MissingObject::Table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryDecision {
    pub retry: bool,
    pub missing: Option<MissingObject>,
    pub error: ServiceError,
}

/// Decide whether `error` is worth retrying for a query that asked for
/// `database` in `catalog`.
pub fn evaluate(error: &ServiceError, database: &str, catalog: &str) -> RetryDecision {
    let missing = MissingObject::from_message(&error.message);

    let retry = match (&error.kind, &missing) {
        (ServiceErrorKind::Programming, _) => false,
        (_, Some(MissingObject::Catalog(name))) => name != catalog,
        (_, Some(MissingObject::Database(name))) => name != database,
        (_, Some(MissingObject::Table(name))) => name != database && name != catalog,
        (_, None) => true,
    };

    RetryDecision {
        retry,
        missing,
        error: error.clone(),
    }
}

/// Names the query context a retried call belongs to
#[derive(Debug, Clone, Copy)]
pub struct RetryScope<'a> {
    pub operation: &'static str,
    pub query_id: Option<&'a str>,
    pub database: &'a str,
    pub catalog: &'a str,
}

/// Bounded constant-interval retry
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    pub max_duration: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 10,
            max_duration: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    pub fn new(interval: Duration, max_attempts: u32, max_duration: Duration) -> Self {
        Self {
            interval,
            max_attempts,
            max_duration,
        }
    }

    /// Whether another attempt fits the budget after `failures` failed attempts
    pub fn allows(&self, failures: u32, started: Instant) -> bool {
        failures < self.max_attempts && started.elapsed() + self.interval <= self.max_duration
    }

    /// Run `operation` until it succeeds, fails terminally, exhausts the
    /// budget or `cancel` fires while waiting.
    pub async fn run<T, F, Fut>(
        &self,
        scope: RetryScope<'_>,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        let started = Instant::now();
        let mut failures = 0u32;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            failures += 1;

            let decision = evaluate(&error, scope.database, scope.catalog);
            if !decision.retry {
                return Err(terminal(scope, error.message));
            }
            if !self.allows(failures, started) {
                warn!(
                    "{} for query {:?} exhausted retry budget after {} attempts",
                    scope.operation, scope.query_id, failures
                );
                return Err(terminal(
                    scope,
                    format!("retry budget exhausted: {}", error.message),
                ));
            }

            let transient = AthenaError::TransientService(error.message);
            warn!(
                "{} for query {:?} retrying in {:?} ({}/{}): {}",
                scope.operation, scope.query_id, self.interval, failures, self.max_attempts, transient
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(AthenaError::Cancelled(scope.query_id.unwrap_or_default().to_string()));
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

fn terminal(scope: RetryScope<'_>, message: String) -> AthenaError {
    AthenaError::TerminalQuery {
        query_id: scope.query_id.map(str::to_string),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn operational(message: &str) -> ServiceError {
        ServiceError::operational(message)
    }

    fn retry(error: &ServiceError, database: &str, catalog: &str) -> bool {
        evaluate(error, database, catalog).retry
    }

    #[test]
    fn test_missing_database_matches_requested_database() {
        for template in [
            "Database does_not_exist not found. Please check your query.",
            "Namespace does_not_exist not found. Please check your query.",
        ] {
            let exc = operational(template);
            assert!(!retry(&exc, "does_not_exist", "does_not_exist"));
            assert!(!retry(&exc, "does_not_exist", "this_does_not_exist"));
            assert!(retry(&exc, "this_does_not_exist", "does_not_exist"));
            assert!(retry(&exc, "this_does_not_exist", "this_does_not_exist"));
        }
    }

    #[test]
    fn test_missing_catalog_matches_requested_catalog() {
        let exc = operational("Catalog my_catalog not found. Please check your query.");
        assert!(!retry(&exc, "db", "my_catalog"));
        assert!(retry(&exc, "my_catalog", "other_catalog"));
    }

    #[test]
    fn test_missing_table_differs_from_both_identifiers() {
        let exc = operational("Table does_not_exist not found. Please check your query.");
        assert!(!retry(&exc, "does_not_exist", "does_not_exist"));
        assert!(!retry(&exc, "does_not_exist", "this_does_not_exist"));
        assert!(!retry(&exc, "this_does_not_exist", "does_not_exist"));
        assert!(retry(&exc, "this_does_not_exist", "this_does_not_exist"));
    }

    #[test]
    fn test_unclassified_errors_are_retried() {
        let exc = operational("foobar.");
        let decision = evaluate(&exc, "foobar", "foobar");
        assert!(decision.retry);
        assert_eq!(decision.missing, None);
        assert_eq!(decision.error, exc);
    }

    #[test]
    fn test_programming_errors_are_never_retried() {
        let exc = ServiceError::programming("Database does_not_exist not found. Please check your query.");
        assert!(!retry(&exc, "does_not_exist", "does_not_exist"));
        assert!(!retry(&exc, "does_not_exist", "this_does_not_exist"));
        assert!(!retry(&exc, "this_does_not_exist", "does_not_exist"));
        assert!(!retry(&exc, "this_does_not_exist", "this_does_not_exist"));
        assert!(!retry(&ServiceError::programming("SYNTAX_ERROR: line 1:1"), "a", "b"));
    }

    #[test]
    fn test_missing_object_extraction() {
        assert_eq!(
            MissingObject::from_message("Database sales not found. Please check your query."),
            Some(MissingObject::Database("sales".to_string()))
        );
        assert_eq!(
            MissingObject::from_message("Table 'orders' not found."),
            Some(MissingObject::Table("orders".to_string()))
        );
        assert_eq!(MissingObject::from_message("Throttling: Rate exceeded"), None);
    }

    fn scope() -> RetryScope<'static> {
        RetryScope {
            operation: "test",
            query_id: Some("q1"),
            database: "db",
            catalog: "cat",
        }
    }

    #[tokio::test]
    async fn test_run_retries_transient_then_succeeds() {
        let policy = RetryPolicy::new(Duration::from_millis(1), 5, Duration::from_secs(5));
        let attempts = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let value = policy
            .run(scope(), &cancel, || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(operational("Rate exceeded"))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_stops_on_terminal_error() {
        let policy = RetryPolicy::new(Duration::from_millis(1), 5, Duration::from_secs(5));
        let attempts = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let err = policy
            .run(scope(), &cancel, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(operational("Database db not found. Please check your query.")) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AthenaError::TerminalQuery { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_exhausts_attempt_budget() {
        let policy = RetryPolicy::new(Duration::from_millis(1), 3, Duration::from_secs(5));
        let attempts = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let err = policy
            .run(scope(), &cancel, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(operational("Internal error")) }
            })
            .await
            .unwrap_err();

        match err {
            AthenaError::TerminalQuery { query_id, message } => {
                assert_eq!(query_id.as_deref(), Some("q1"));
                assert!(message.contains("retry budget exhausted"));
                assert!(message.contains("Internal error"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_observes_cancellation_while_waiting() {
        let policy = RetryPolicy::new(Duration::from_secs(60), 5, Duration::from_secs(600));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = policy
            .run(scope(), &cancel, || async { Err::<(), _>(operational("Internal error")) })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
    }
}
