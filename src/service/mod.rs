//! Service adapters implementing `QueryService`

pub mod athena_http;

pub use athena_http::{AthenaHttpService, MAX_RESULTS_PER_PAGE};
