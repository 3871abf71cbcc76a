//! Append-only snapshot persistence.
//!
//! [`SnapshotStore`] is the async trait the ingestor, reader and read API work
//! against. [`SqliteSnapshotStore`] implements it on top of a shared
//! [`Database`]. Scans are paginated: each call returns at most one page and the
//! key to resume from, and callers loop until no key comes back.

mod sqlite;

pub use sqlite::{Database, SqliteSnapshotStore, Table};

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::model::{EntityRecord, ObjectType};

/// Records written per batch. Each batch commits on its own.
pub const BATCH_SIZE: usize = 25;

/// Resume point for a paginated scan (the last record key of the previous page).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageKey(pub String);

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub last_evaluated_key: Option<PageKey>,
}

/// Scan predicate. An empty type list matches every type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilter {
    pub object_types: Vec<ObjectType>,
    pub timestamp: Option<i64>,
}

impl ScanFilter {
    pub fn types(object_types: &[ObjectType]) -> Self {
        Self {
            object_types: object_types.to_vec(),
            timestamp: None,
        }
    }

    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persists `records` in batches of [`BATCH_SIZE`]. Returns the number written.
    ///
    /// Not atomic: on error, earlier batches stay committed and the cycle is partial.
    async fn append(&self, records: &[EntityRecord]) -> StoreResult<usize>;

    /// One page of records matching `filter`, starting after `start`.
    async fn scan_page(
        &self,
        filter: &ScanFilter,
        start: Option<PageKey>,
    ) -> StoreResult<Page<EntityRecord>>;

    /// Like [`SnapshotStore::scan_page`], projected onto the timestamp. Records without
    /// a timestamp are skipped.
    async fn scan_timestamps_page(
        &self,
        filter: &ScanFilter,
        start: Option<PageKey>,
    ) -> StoreResult<Page<i64>>;

    /// Index-backed lookup of every record of one type.
    async fn query_by_type(&self, object_type: ObjectType) -> StoreResult<Vec<EntityRecord>>;

    /// Follows pagination until the store reports no further key.
    async fn scan_all(&self, filter: &ScanFilter) -> StoreResult<Vec<EntityRecord>> {
        let mut items = Vec::new();
        let mut start = None;
        let mut pages = 0usize;
        loop {
            let page = self.scan_page(filter, start).await?;
            pages += 1;
            items.extend(page.items);
            match page.last_evaluated_key {
                Some(key) => start = Some(key),
                None => break,
            }
        }
        tracing::debug!(pages, records = items.len(), "Scan complete");
        Ok(items)
    }

    async fn scan_all_timestamps(&self, filter: &ScanFilter) -> StoreResult<Vec<i64>> {
        let mut items = Vec::new();
        let mut start = None;
        loop {
            let page = self.scan_timestamps_page(filter, start).await?;
            items.extend(page.items);
            match page.last_evaluated_key {
                Some(key) => start = Some(key),
                None => break,
            }
        }
        Ok(items)
    }
}
