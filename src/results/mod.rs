//! Results Module - paged retrieval of raw result rows
//!
//! Two strategies share the `ResultPage` contract:
//! - DirectResultSource pages through the service's results API
//! - BulkFileResultSource streams the result file from object storage

pub mod bulk;
pub mod direct;
pub mod page;
pub mod storage;

pub use bulk::BulkFileResultSource;
pub use direct::DirectResultSource;
pub use page::{RawRow, ResultPage};
pub use storage::{HttpObjectStorage, LocalObjectStorage, ObjectReader, ObjectStorage};

use crate::error::Result;
use crate::types::ColumnDescriptor;
use std::sync::Arc;

pub enum ResultSource {
    Direct(DirectResultSource),
    BulkFile(BulkFileResultSource),
}

impl ResultSource {
    pub fn name(&self) -> &'static str {
        match self {
            ResultSource::Direct(_) => "direct_api",
            ResultSource::BulkFile(_) => "bulk_file",
        }
    }

    /// Fetch one page; `None` starts from the first page
    pub async fn fetch(&mut self, token: Option<&str>) -> Result<ResultPage> {
        match self {
            ResultSource::Direct(source) => source.fetch(token).await,
            ResultSource::BulkFile(source) => source.fetch(token).await,
        }
    }
}

/// Walks a `ResultSource` page by page in continuation-token order
pub struct ResultPager {
    source: ResultSource,
    next_token: Option<String>,
    started: bool,
    exhausted: bool,
    columns: Option<Arc<Vec<ColumnDescriptor>>>,
}

impl ResultPager {
    pub fn new(source: ResultSource) -> Self {
        Self {
            source,
            next_token: None,
            started: false,
            exhausted: false,
            columns: None,
        }
    }

    pub fn source(&self) -> &ResultSource {
        &self.source
    }

    pub fn columns(&self) -> Option<&Arc<Vec<ColumnDescriptor>>> {
        self.columns.as_ref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Next page, or `None` once the final page has been returned
    pub async fn next_page(&mut self) -> Result<Option<ResultPage>> {
        if self.exhausted {
            return Ok(None);
        }

        let token = if self.started {
            self.next_token.clone()
        } else {
            None
        };
        let page = self.source.fetch(token.as_deref()).await?;

        self.started = true;
        self.next_token = page.next_token().map(str::to_string);
        self.exhausted = page.is_last();
        if self.columns.is_none() || !page.columns().is_empty() {
            self.columns = Some(page.columns().clone());
        }
        Ok(Some(page))
    }

    /// Start over from the first page
    pub fn restart(&mut self) {
        self.next_token = None;
        self.started = false;
        self.exhausted = false;
    }
}
