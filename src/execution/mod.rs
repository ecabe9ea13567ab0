//! Execution Module - submission, status polling, retry and cancellation
//!
//! - QueryService trait for the remote service
//! - QueryExecution record for one submitted query
//! - RetryPolicy for transient-vs-terminal classification
//! - StatusPoller driving an execution to a terminal state

pub mod cancel;
pub mod poller;
pub mod query_execution;
pub mod retry;
pub mod service;

pub use cancel::cancel_on_ctrl_c;
pub use poller::StatusPoller;
pub use query_execution::QueryExecution;
pub use retry::{evaluate, MissingObject, RetryDecision, RetryPolicy, RetryScope};
pub use service::{
    QueryService, QueryState, QueryStatus, ResultFileFormat, ResultLocation, ResultsResponse,
    ServiceError, ServiceErrorKind, ServiceResult, SubmitRequest, TableRef,
};
