//! Remote dataset publishing
//!
//! The remote table is an external collaborator behind the `RemoteTable`
//! trait. `DatasetSink` layers the merge strategy on top: replace-with-union
//! reads the whole table and republishes it with the new rows, append writes
//! only the new rows. Either way a batch is published in one write and URLs
//! repeated inside a batch are dropped. Only replace-with-union also drops
//! URLs already present remotely; append relies on the checkpoint for that.

pub mod hub;
pub mod memory;

pub use hub::{HubCredentials, HubTable};
pub use memory::MemoryTable;

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::PublishStrategy;
use crate::types::Record;

/// Errors from the remote dataset service
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Dataset service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Malformed row at line {line} of {file}: {reason}")]
    MalformedRow { file: String, line: usize, reason: String },
    #[error("Publish rejected: {0}")]
    Rejected(String),
    #[error("{path} is {size} bytes, above the {limit}-byte inline commit limit")]
    PayloadTooLarge { path: String, size: usize, limit: usize },
}

/// Result of reading the remote table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableState {
    /// The dataset does not exist yet
    Missing,
    /// The dataset exists with these rows (possibly none)
    Present(Vec<Record>),
}

impl TableState {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Rows in the table, empty when missing
    pub fn records(&self) -> &[Record] {
        match self {
            Self::Missing => &[],
            Self::Present(records) => records,
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Missing => Vec::new(),
            Self::Present(records) => records,
        }
    }
}

/// A remote tabular dataset keyed by the `URL` column
#[async_trait]
pub trait RemoteTable: Send + Sync {
    /// Read the full table
    async fn load(&self) -> Result<TableState, DatasetError>;

    /// Publish `records` as the complete new table state
    async fn replace(&self, records: &[Record]) -> Result<(), DatasetError>;

    /// Add `records` without reading the table; `batch` names the shard
    async fn append(&self, records: &[Record], batch: usize) -> Result<(), DatasetError>;
}

#[async_trait]
impl<T: RemoteTable + ?Sized> RemoteTable for Arc<T> {
    async fn load(&self) -> Result<TableState, DatasetError> {
        (**self).load().await
    }

    async fn replace(&self, records: &[Record]) -> Result<(), DatasetError> {
        (**self).replace(records).await
    }

    async fn append(&self, records: &[Record], batch: usize) -> Result<(), DatasetError> {
        (**self).append(records, batch).await
    }
}

/// What a publish actually wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Rows newly written
    pub published: usize,
    /// Rows skipped because their URL was already present
    pub already_present: usize,
    /// Table size after the write (replace-with-union only)
    pub table_rows: Option<usize>,
}

/// Publishes batches into a remote table using one merge strategy
pub struct DatasetSink<T> {
    table: T,
    strategy: PublishStrategy,
}

impl<T: RemoteTable> DatasetSink<T> {
    pub fn new(table: T, strategy: PublishStrategy) -> Self {
        Self { table, strategy }
    }

    pub fn strategy(&self) -> PublishStrategy {
        self.strategy
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    /// Read the current remote table
    pub async fn load(&self) -> Result<TableState, DatasetError> {
        self.table.load().await
    }

    /// Publish one batch. Empty batches never reach the remote table.
    pub async fn publish(&self, batch: usize, records: Vec<Record>) -> Result<PublishOutcome, DatasetError> {
        if records.is_empty() {
            debug!(batch, "empty batch, nothing to publish");
            return Ok(PublishOutcome::default());
        }

        match self.strategy {
            PublishStrategy::ReplaceWithUnion => self.publish_union(batch, records).await,
            PublishStrategy::Append => self.publish_append(batch, records).await,
        }
    }

    async fn publish_union(&self, batch: usize, records: Vec<Record>) -> Result<PublishOutcome, DatasetError> {
        let state = self.table.load().await?;
        if state.is_missing() {
            info!(batch, "Remote dataset does not exist yet, it will be created");
        }

        let mut rows = state.into_records();
        let existing = rows.len();
        let mut seen: HashSet<String> = rows.iter().map(|r| r.url.clone()).collect();

        let incoming = records.len();
        rows.extend(records.into_iter().filter(|r| seen.insert(r.url.clone())));
        let published = rows.len() - existing;
        let already_present = incoming - published;

        if published == 0 {
            info!(batch, "All {} records already present remotely, skipping write", incoming);
            return Ok(PublishOutcome {
                published,
                already_present,
                table_rows: Some(rows.len()),
            });
        }

        self.table.replace(&rows).await?;
        info!(
            batch,
            published,
            already_present,
            "Published union of {} existing and {} new records",
            existing,
            published
        );

        Ok(PublishOutcome {
            published,
            already_present,
            table_rows: Some(rows.len()),
        })
    }

    async fn publish_append(&self, batch: usize, records: Vec<Record>) -> Result<PublishOutcome, DatasetError> {
        let incoming = records.len();
        let mut seen = HashSet::new();
        let rows: Vec<Record> = records.into_iter().filter(|r| seen.insert(r.url.clone())).collect();

        self.table.append(&rows, batch).await?;
        info!(batch, published = rows.len(), "Appended batch shard");

        Ok(PublishOutcome {
            published: rows.len(),
            already_present: incoming - rows.len(),
            table_rows: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: u32) -> Record {
        Record::new(format!("https://example.eu/doc/{n}"), format!("text {n}"), "test")
    }

    #[tokio::test]
    async fn test_empty_batch_skips_remote() {
        let sink = DatasetSink::new(MemoryTable::new(), PublishStrategy::ReplaceWithUnion);
        let outcome = sink.publish(1, Vec::new()).await.unwrap();

        assert_eq!(outcome, PublishOutcome::default());
        assert_eq!(sink.table().write_count(), 0);
        assert!(sink.table().state().is_missing());
    }

    #[tokio::test]
    async fn test_union_keeps_existing_rows_in_order() {
        let table = MemoryTable::with_records(vec![record(1), record(2)]);
        let sink = DatasetSink::new(table, PublishStrategy::ReplaceWithUnion);

        let outcome = sink.publish(1, vec![record(3)]).await.unwrap();
        assert_eq!(outcome.published, 1);
        assert_eq!(outcome.table_rows, Some(3));

        let urls: Vec<String> = sink.table().rows().into_iter().map(|r| r.url).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.eu/doc/1",
                "https://example.eu/doc/2",
                "https://example.eu/doc/3"
            ]
        );
    }

    #[tokio::test]
    async fn test_union_drops_known_and_repeated_urls() {
        let table = MemoryTable::with_records(vec![record(1)]);
        let sink = DatasetSink::new(table, PublishStrategy::ReplaceWithUnion);

        let outcome = sink.publish(1, vec![record(1), record(2), record(2)]).await.unwrap();
        assert_eq!(outcome.published, 1);
        assert_eq!(outcome.already_present, 2);
        assert_eq!(sink.table().rows().len(), 2);
    }

    #[tokio::test]
    async fn test_union_with_nothing_new_does_not_write() {
        let table = MemoryTable::with_records(vec![record(1)]);
        let sink = DatasetSink::new(table, PublishStrategy::ReplaceWithUnion);

        let outcome = sink.publish(1, vec![record(1)]).await.unwrap();
        assert_eq!(outcome.published, 0);
        assert_eq!(sink.table().write_count(), 0);
    }

    #[tokio::test]
    async fn test_append_never_reads_table() {
        let table = MemoryTable::with_records(vec![record(1)]);
        let sink = DatasetSink::new(table, PublishStrategy::Append);

        let outcome = sink.publish(4, vec![record(2), record(2)]).await.unwrap();
        assert_eq!(outcome.published, 1);
        assert_eq!(outcome.table_rows, None);
        assert_eq!(sink.table().load_count(), 0);
        assert_eq!(sink.table().rows().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_propagates() {
        let table = MemoryTable::new();
        table.fail_next_write("quota exceeded");
        let sink = DatasetSink::new(table, PublishStrategy::ReplaceWithUnion);

        let err = sink.publish(1, vec![record(1)]).await.unwrap_err();
        assert!(matches!(err, DatasetError::Rejected(_)));
        assert!(sink.table().rows().is_empty());
    }
}
