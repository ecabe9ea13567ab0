//! Direct-API result retrieval
//!
//! Pages come straight from the service's results API. The first page of a
//! SELECT carries a synthetic header row equal to the column names; it is
//! dropped from the first page only.

use crate::error::Result;
use crate::execution::retry::{RetryPolicy, RetryScope};
use crate::execution::service::QueryService;
use crate::results::page::{RawRow, ResultPage};
use crate::types::ColumnDescriptor;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct DirectResultSource {
    service: Arc<dyn QueryService>,
    query_id: String,
    database: String,
    catalog: String,
    max_rows: usize,
    retry: RetryPolicy,
    cancel: CancellationToken,
    columns: Option<Arc<Vec<ColumnDescriptor>>>,
}

impl DirectResultSource {
    pub fn new(
        service: Arc<dyn QueryService>,
        query_id: impl Into<String>,
        database: impl Into<String>,
        catalog: impl Into<String>,
        max_rows: usize,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service,
            query_id: query_id.into(),
            database: database.into(),
            catalog: catalog.into(),
            max_rows,
            retry,
            cancel,
            columns: None,
        }
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    /// Fetch the page addressed by `token`; `None` starts from the beginning
    pub async fn fetch(&mut self, token: Option<&str>) -> Result<ResultPage> {
        let service = &self.service;
        let query_id = self.query_id.as_str();
        let max_rows = self.max_rows;
        let scope = RetryScope {
            operation: "GetQueryResults",
            query_id: Some(query_id),
            database: &self.database,
            catalog: &self.catalog,
        };

        let response = self
            .retry
            .run(scope, &self.cancel, || service.get_query_results(query_id, token, max_rows))
            .await?;

        let mut rows = response.rows;
        if token.is_none() && is_header_row(&response.columns, rows.first()) {
            rows.remove(0);
        }

        let reuse_columns = token.is_some() || response.columns.is_empty();
        let columns = match self.columns.clone() {
            Some(columns) if reuse_columns => columns,
            _ => {
                let columns = Arc::new(ColumnDescriptor::normalize(response.columns));
                self.columns = Some(columns.clone());
                columns
            }
        };

        debug!(
            "Fetched {} rows for query {} (next token: {})",
            rows.len(),
            self.query_id,
            response.next_token.is_some()
        );
        Ok(ResultPage::new(columns, rows, response.next_token).with_update_count(response.update_count))
    }
}

fn is_header_row(columns: &[ColumnDescriptor], row: Option<&RawRow>) -> bool {
    match row {
        Some(row) if !columns.is_empty() && row.len() == columns.len() => columns
            .iter()
            .zip(row.iter())
            .all(|(column, cell)| cell.as_deref() == Some(column.name.as_str())),
        _ => false,
    }
}
