//! Client-side engine for a remote, asynchronous SQL query service.
//!
//! A `Connection` hands out `Cursor`s. Each cursor submits one query at a time,
//! polls it to a terminal state, then pages and casts the result rows either
//! through the service's results API or by streaming the result file the
//! service wrote to object storage.

pub mod config;
pub mod cursor;
pub mod error;
pub mod execution;
pub mod logging;
pub mod results;
pub mod service;
pub mod types;

pub use config::{EngineConfig, ResultFormat};
pub use cursor::{Connection, Cursor, CursorState};
pub use error::{AthenaError, Result};
pub use execution::{
    cancel_on_ctrl_c, QueryExecution, QueryService, QueryState, QueryStatus, ResultLocation,
    RetryPolicy, ServiceError, ServiceErrorKind,
};
pub use results::{HttpObjectStorage, LocalObjectStorage, ObjectStorage};
pub use service::AthenaHttpService;
pub use types::{ColumnDescriptor, NullSentinels, TypeCaster, TypeFamily, TypedRow, Value};
