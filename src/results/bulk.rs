//! Bulk-file result retrieval
//!
//! Streams the delimited result file the service wrote to object storage and
//! cuts it into pages. Column metadata comes from a schema call, never from
//! the file header. Parsing runs on a blocking task and hands pages over a
//! bounded channel, so at most a few pages are in memory at once.

use crate::error::{AthenaError, Result};
use crate::execution::retry::{RetryPolicy, RetryScope};
use crate::execution::service::{QueryService, ResultFileFormat, ResultLocation};
use crate::results::page::{RawRow, ResultPage};
use crate::results::storage::{ObjectReader, ObjectStorage};
use crate::types::ColumnDescriptor;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const PAGE_BUFFER: usize = 2;

type PageBatch = Result<Vec<RawRow>>;

struct PageStream {
    receiver: mpsc::Receiver<PageBatch>,
    lookahead: Option<PageBatch>,
    next_index: u64,
}

pub struct BulkFileResultSource {
    storage: Arc<dyn ObjectStorage>,
    location: ResultLocation,
    columns: Arc<Vec<ColumnDescriptor>>,
    query_id: String,
    database: String,
    catalog: String,
    page_size: usize,
    retry: RetryPolicy,
    cancel: CancellationToken,
    stream: Option<PageStream>,
}

impl BulkFileResultSource {
    /// Resolve the result columns and prepare to stream `location`.
    ///
    /// Columns come from the table schema when the location names one,
    /// otherwise from a one-row metadata fetch on the results API.
    #[allow(clippy::too_many_arguments)]
    pub async fn open(
        service: Arc<dyn QueryService>,
        storage: Arc<dyn ObjectStorage>,
        location: ResultLocation,
        query_id: impl Into<String>,
        database: impl Into<String>,
        catalog: impl Into<String>,
        page_size: usize,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let query_id = query_id.into();
        let database = database.into();
        let catalog = catalog.into();

        let columns = {
            let service = &service;
            match &location.table {
                Some(table) => {
                    let scope = RetryScope {
                        operation: "GetTableSchema",
                        query_id: Some(&query_id),
                        database: &database,
                        catalog: &catalog,
                    };
                    retry
                        .run(scope, &cancel, || service.get_table_schema(&table.database, &table.table))
                        .await?
                }
                None => {
                    let scope = RetryScope {
                        operation: "GetQueryResults",
                        query_id: Some(&query_id),
                        database: &database,
                        catalog: &catalog,
                    };
                    retry
                        .run(scope, &cancel, || service.get_query_results(&query_id, None, 1))
                        .await?
                        .columns
                }
            }
        };

        Ok(Self {
            storage,
            location,
            columns: Arc::new(ColumnDescriptor::normalize(columns)),
            query_id,
            database,
            catalog,
            page_size,
            retry,
            cancel,
            stream: None,
        })
    }

    pub fn columns(&self) -> &Arc<Vec<ColumnDescriptor>> {
        &self.columns
    }

    pub fn location(&self) -> &ResultLocation {
        &self.location
    }

    /// Fetch the page addressed by `token`.
    ///
    /// `None` (re)starts the download from the beginning. Other tokens must be
    /// the one returned with the previous page; the file is read sequentially.
    pub async fn fetch(&mut self, token: Option<&str>) -> Result<ResultPage> {
        match token {
            None => {
                self.stream = Some(self.start_stream().await?);
            }
            Some(token) => {
                let expected = self.stream.as_ref().map(|s| s.next_index.to_string());
                if expected.as_deref() != Some(token) {
                    return Err(AthenaError::Usage(format!(
                        "bulk results of query {} can only resume from the latest continuation token",
                        self.query_id
                    )));
                }
            }
        }

        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Err(AthenaError::Usage("bulk result stream is not open".to_string())),
        };

        let current = match stream.lookahead.take() {
            Some(batch) => Some(batch),
            None => stream.receiver.recv().await,
        };
        let rows = match current {
            Some(batch) => batch?,
            None => {
                self.stream = None;
                return Ok(ResultPage::new(self.columns.clone(), Vec::new(), None));
            }
        };

        stream.lookahead = stream.receiver.recv().await;
        stream.next_index += 1;
        let next_token = stream.lookahead.as_ref().map(|_| stream.next_index.to_string());

        debug!(
            "Read {} rows of query {} from {}",
            rows.len(),
            self.query_id,
            self.location.uri
        );
        if next_token.is_none() {
            info!("Finished reading result file {}", self.location.uri);
        }
        Ok(ResultPage::new(self.columns.clone(), rows, next_token))
    }

    async fn start_stream(&self) -> Result<PageStream> {
        let storage = &self.storage;
        let uri = self.location.uri.as_str();
        let scope = RetryScope {
            operation: "GetObject",
            query_id: Some(&self.query_id),
            database: &self.database,
            catalog: &self.catalog,
        };

        info!("Downloading result file {} for query {}", uri, self.query_id);
        let reader = self
            .retry
            .run(scope, &self.cancel, || storage.get_object(uri))
            .await?;

        Ok(PageStream {
            receiver: spawn_parser(reader, self.location.format, self.page_size),
            lookahead: None,
            next_index: 0,
        })
    }
}

fn spawn_parser(reader: ObjectReader, format: ResultFileFormat, page_size: usize) -> mpsc::Receiver<PageBatch> {
    let (sender, receiver) = mpsc::channel(PAGE_BUFFER);
    let bridge = SyncIoBridge::new(reader);

    tokio::task::spawn_blocking(move || {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(format.delimiter())
            .has_headers(format.has_header())
            .quoting(format == ResultFileFormat::Csv)
            .flexible(true)
            .from_reader(bridge);

        let mut batch: Vec<RawRow> = Vec::with_capacity(page_size);
        for record in csv_reader.records() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    let _ = sender.blocking_send(Err(e.into()));
                    return;
                }
            };
            batch.push(
                record
                    .iter()
                    .map(|cell| if cell.is_empty() { None } else { Some(cell.to_string()) })
                    .collect(),
            );
            if batch.len() >= page_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(page_size));
                if sender.blocking_send(Ok(full)).is_err() {
                    // Receiver dropped: the cursor was closed or restarted
                    return;
                }
            }
        }
        if !batch.is_empty() {
            let _ = sender.blocking_send(Ok(batch));
        }
    });

    receiver
}
