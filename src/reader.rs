//! "Latest cycle" reads over an append-only store.
//!
//! The store has no native notion of the newest snapshot, so [`SnapshotReader::latest`]
//! does it in two round trips: find the highest timestamp, then fetch every record
//! stamped with it. Nothing is locked between the two phases, so a cycle that
//! finishes in between is not observed.

use std::sync::Arc;

use serde::Serialize;

use crate::error::ReadError;
use crate::model::{EntityRecord, ObjectType};
use crate::store::{ScanFilter, SnapshotStore};

/// Every record of one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub timestamp: i64,
    pub records: Vec<EntityRecord>,
}

#[derive(Clone)]
pub struct SnapshotReader {
    store: Arc<dyn SnapshotStore>,
}

impl SnapshotReader {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    /// Highest cycle timestamp among records of `types` (any type when empty).
    pub async fn max_timestamp(&self, types: &[ObjectType]) -> Result<i64, ReadError> {
        let timestamps = self
            .store
            .scan_all_timestamps(&ScanFilter::types(types))
            .await?;
        timestamps.into_iter().max().ok_or(ReadError::EmptyResult)
    }

    pub async fn records_at(
        &self,
        timestamp: i64,
        types: &[ObjectType],
    ) -> Result<Vec<EntityRecord>, ReadError> {
        let filter = ScanFilter::types(types).at(timestamp);
        Ok(self.store.scan_all(&filter).await?)
    }

    #[tracing::instrument(skip(self), fields(types = ?types))]
    pub async fn latest(&self, types: &[ObjectType]) -> Result<Snapshot, ReadError> {
        let timestamp = self.max_timestamp(types).await?;
        let records = self.records_at(timestamp, types).await?;
        tracing::debug!(timestamp, records = records.len(), "Latest snapshot read");
        Ok(Snapshot { timestamp, records })
    }
}
