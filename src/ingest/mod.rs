//! One ingestion cycle: fetch every live feed concurrently, merge, stamp with a
//! single timestamp and append the batch to the transient store.

mod merge;

pub use merge::merge;

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use tracing::{Instrument, debug, error, info, warn};

use crate::error::{IngestError, ReadError};
use crate::model::{EntityKind, EntityRecord};
use crate::reader::SnapshotReader;
use crate::reference::ReferenceCatalog;
use crate::sources::SourceAdapter;
use crate::store::SnapshotStore;

/// What to do when some feeds fail and others succeed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Any failed feed fails the cycle and nothing is written.
    #[default]
    Abort,
    /// Successful feeds are written; failed ones are reported.
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AdapterStatus {
    Ok { records: usize },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterOutcome {
    pub source: &'static str,
    #[serde(flatten)]
    pub status: AdapterStatus,
}

impl AdapterOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self.status, AdapterStatus::Ok { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub timestamp: i64,
    pub outcomes: Vec<AdapterOutcome>,
    pub written: usize,
    pub join_mismatches: usize,
}

/// A merged cycle that has not been written yet.
#[derive(Debug, Clone)]
pub struct PreparedCycle {
    pub records: Vec<EntityRecord>,
    pub report: CycleReport,
}

pub struct Ingestor {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    transient: Arc<dyn SnapshotStore>,
    permanent: Arc<dyn SnapshotStore>,
    policy: FailurePolicy,
    last_cycle: Mutex<Option<i64>>,
}

impl Ingestor {
    pub fn new(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        transient: Arc<dyn SnapshotStore>,
        permanent: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            adapters,
            transient,
            permanent,
            policy: FailurePolicy::default(),
            last_cycle: Mutex::new(None),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Timestamp for a new cycle: `now`, or one past the previous cycle if the clock
    /// has not moved beyond it.
    fn next_timestamp(&self, now: i64) -> i64 {
        let mut last = self.last_cycle();
        let timestamp = match *last {
            Some(prev) if now <= prev => prev + 1,
            _ => now,
        };
        *last = Some(timestamp);
        timestamp
    }

    fn last_cycle(&self) -> MutexGuard<'_, Option<i64>> {
        match self.last_cycle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Picks up the newest cycle already in the transient store, so a fresh process
    /// never reuses a timestamp written by an earlier run.
    async fn seed_last_cycle(&self) -> Result<(), IngestError> {
        if self.last_cycle().is_some() {
            return Ok(());
        }
        let stored = match SnapshotReader::new(self.transient.clone()).max_timestamp(&[]).await {
            Ok(timestamp) => Some(timestamp),
            Err(ReadError::EmptyResult) => None,
            Err(ReadError::Store(e)) => return Err(e.into()),
        };
        let mut last = self.last_cycle();
        if let Some(stored) = stored {
            *last = Some(last.map_or(stored, |prev| prev.max(stored)));
            debug!(last_cycle = stored, "Seeded cycle clock from store");
        }
        Ok(())
    }

    /// Runs every adapter as its own task and waits for all of them.
    async fn fetch_all(&self) -> Vec<(&'static str, Result<Vec<EntityRecord>, IngestError>)> {
        let mut tasks = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            let name = adapter.name();
            let adapter = Arc::clone(adapter);
            let span = tracing::info_span!("fetch_source", source = name);
            let task = tokio::spawn(async move { adapter.fetch().await }.instrument(span));
            tasks.push((name, task));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for (name, task) in tasks {
            let result = match task.await {
                Ok(Ok(records)) => Ok(records),
                Ok(Err(error)) => Err(IngestError::Source { name, error }),
                Err(error) => Err(IngestError::Task { name, error }),
            };
            if let Err(e) = &result {
                error!(error = %e, "Source failed");
            }
            results.push((name, result));
        }
        results
    }

    /// Fetches and merges one cycle stamped with `timestamp` without writing it.
    #[tracing::instrument(skip(self), fields(policy = ?self.policy))]
    pub async fn prepare(&self, timestamp: i64) -> Result<PreparedCycle, IngestError> {
        let results = self.fetch_all().await;

        let mut outcomes = Vec::with_capacity(results.len());
        let mut batches = Vec::new();
        let mut first_error = None;
        for (name, result) in results {
            match result {
                Ok(records) => {
                    outcomes.push(AdapterOutcome {
                        source: name,
                        status: AdapterStatus::Ok {
                            records: records.len(),
                        },
                    });
                    batches.push(records);
                }
                Err(e) => {
                    outcomes.push(AdapterOutcome {
                        source: name,
                        status: AdapterStatus::Failed {
                            error: e.to_string(),
                        },
                    });
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            match self.policy {
                FailurePolicy::Abort => return Err(e),
                FailurePolicy::Partial if batches.is_empty() => {
                    return Err(IngestError::AllSourcesFailed);
                }
                FailurePolicy::Partial => {
                    warn!(
                        failed = outcomes.iter().filter(|o| !o.is_ok()).count(),
                        "Writing partial cycle"
                    );
                }
            }
        }

        let has_buses = batches
            .iter()
            .flatten()
            .any(|r| matches!(r.kind, EntityKind::Bus(_)));
        let catalog = if has_buses {
            ReferenceCatalog::load(self.permanent.as_ref()).await?
        } else {
            ReferenceCatalog::default()
        };

        let (records, join_mismatches) = merge(batches, &catalog, timestamp);
        if join_mismatches > 0 {
            warn!(join_mismatches, "Buses without route metadata");
        }

        Ok(PreparedCycle {
            records,
            report: CycleReport {
                timestamp,
                outcomes,
                written: 0,
                join_mismatches,
            },
        })
    }

    /// Runs a cycle at an explicit timestamp.
    pub async fn run_cycle_at(&self, timestamp: i64) -> Result<CycleReport, IngestError> {
        let PreparedCycle {
            records,
            mut report,
        } = self.prepare(timestamp).await?;

        report.written = self.transient.append(&records).await?;
        info!(
            timestamp,
            written = report.written,
            join_mismatches = report.join_mismatches,
            "Cycle written"
        );
        Ok(report)
    }

    /// Runs a cycle stamped with the current time.
    pub async fn run_cycle(&self) -> Result<CycleReport, IngestError> {
        self.seed_last_cycle().await?;
        let timestamp = self.next_timestamp(Utc::now().timestamp());
        self.run_cycle_at(timestamp).await
    }

    /// Fetches and merges a cycle stamped with the current time, without writing it.
    pub async fn preview(&self) -> Result<PreparedCycle, IngestError> {
        self.prepare(Utc::now().timestamp()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectType;
    use crate::store::{Database, SqliteSnapshotStore, Table};
    use crate::test_utils::{FakeAdapter, bus, init, route, train};

    struct Fixture {
        transient: Arc<SqliteSnapshotStore>,
        permanent: Arc<SqliteSnapshotStore>,
    }

    impl Fixture {
        async fn new() -> Self {
            let db = Database::open_in_memory().unwrap();
            let permanent = Arc::new(SqliteSnapshotStore::new(db.clone(), Table::Permanent, 100));
            permanent
                .append(&[route("R1", Some("Dublin Bus"))])
                .await
                .unwrap();
            Self {
                transient: Arc::new(SqliteSnapshotStore::new(db, Table::Transient, 100)),
                permanent,
            }
        }

        fn ingestor(&self, adapters: Vec<Arc<dyn SourceAdapter>>) -> Ingestor {
            Ingestor::new(adapters, self.transient.clone(), self.permanent.clone())
        }

        async fn stored(&self) -> Vec<EntityRecord> {
            self.transient.scan_all(&Default::default()).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_cycle_writes_every_source_with_one_timestamp() {
        init();
        let f = Fixture::new().await;
        let ingestor = f.ingestor(vec![
            FakeAdapter::ok("rail", vec![train("A1", 2), train("A2", 0)]),
            FakeAdapter::ok("bus", vec![bus("V1", "R1"), bus("V2", "R404")]),
        ]);

        let report = ingestor.run_cycle_at(1000).await.unwrap();
        assert_eq!(report.written, 4);
        assert_eq!(report.join_mismatches, 1);
        assert!(report.outcomes.iter().all(AdapterOutcome::is_ok));

        let stored = f.stored().await;
        assert_eq!(stored.len(), 4);
        assert!(stored.iter().all(|r| r.timestamp == Some(1000)));
    }

    #[tokio::test]
    async fn test_abort_policy_writes_nothing() {
        let f = Fixture::new().await;
        let ingestor = f.ingestor(vec![
            FakeAdapter::ok("rail", vec![train("A1", 2)]),
            FakeAdapter::failing("bus"),
        ]);

        let err = ingestor.run_cycle_at(1000).await.unwrap_err();
        assert!(matches!(err, IngestError::Source { name: "bus", .. }));
        assert!(f.stored().await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_policy_writes_successful_sources() {
        let f = Fixture::new().await;
        let ingestor = f
            .ingestor(vec![
                FakeAdapter::ok("rail", vec![train("A1", 2)]),
                FakeAdapter::failing("bus"),
            ])
            .with_policy(FailurePolicy::Partial);

        let report = ingestor.run_cycle_at(1000).await.unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(report.outcomes[0].status, AdapterStatus::Ok { records: 1 });
        assert!(matches!(report.outcomes[1].status, AdapterStatus::Failed { .. }));

        let stored = f.stored().await;
        assert_eq!(stored[0].object_type(), ObjectType::IrishRailTrain);
    }

    #[tokio::test]
    async fn test_partial_policy_with_no_success_fails() {
        let f = Fixture::new().await;
        let ingestor = f
            .ingestor(vec![FakeAdapter::failing("rail")])
            .with_policy(FailurePolicy::Partial);
        assert!(matches!(
            ingestor.run_cycle_at(1).await,
            Err(IngestError::AllSourcesFailed)
        ));
    }

    #[tokio::test]
    async fn test_repeated_cycles_get_distinct_timestamps() {
        let f = Fixture::new().await;
        let ingestor = f.ingestor(vec![FakeAdapter::ok("rail", vec![train("A1", 2)])]);

        let first = ingestor.run_cycle().await.unwrap();
        let second = ingestor.run_cycle().await.unwrap();

        assert!(second.timestamp > first.timestamp);
        assert_eq!(f.stored().await.len(), 2);
    }

    #[tokio::test]
    async fn test_separate_ingestors_never_share_a_cycle() {
        let f = Fixture::new().await;
        let first = f.ingestor(vec![FakeAdapter::ok("rail", vec![train("A1", 2)])]);
        let second = f.ingestor(vec![FakeAdapter::ok("rail", vec![train("A1", 2)])]);

        let a = first.run_cycle().await.unwrap();
        let b = second.run_cycle().await.unwrap();

        assert!(b.timestamp > a.timestamp);
        let stored = f.stored().await;
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().any(|r| r.timestamp == Some(a.timestamp)));
        assert!(stored.iter().any(|r| r.timestamp == Some(b.timestamp)));
    }

    #[tokio::test]
    async fn test_clock_seeds_from_a_future_stored_cycle() {
        let f = Fixture::new().await;
        let far_future = Utc::now().timestamp() + 3600;
        f.ingestor(vec![FakeAdapter::ok("rail", vec![train("A1", 2)])])
            .run_cycle_at(far_future)
            .await
            .unwrap();

        let report = f
            .ingestor(vec![FakeAdapter::ok("rail", vec![train("A1", 2)])])
            .run_cycle()
            .await
            .unwrap();
        assert_eq!(report.timestamp, far_future + 1);
    }

    #[test]
    fn test_next_timestamp_never_repeats() {
        let ingestor = Ingestor::new(
            vec![],
            Arc::new(SqliteSnapshotStore::new(
                Database::open_in_memory().unwrap(),
                Table::Transient,
                1,
            )),
            Arc::new(SqliteSnapshotStore::new(
                Database::open_in_memory().unwrap(),
                Table::Permanent,
                1,
            )),
        );
        assert_eq!(ingestor.next_timestamp(100), 100);
        assert_eq!(ingestor.next_timestamp(100), 101);
        assert_eq!(ingestor.next_timestamp(99), 102);
        assert_eq!(ingestor.next_timestamp(500), 500);
    }

    #[test]
    fn test_report_serializes_outcomes_flat() {
        let outcome = AdapterOutcome {
            source: "rail",
            status: AdapterStatus::Failed {
                error: "boom".to_string(),
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["source"], "rail");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "boom");
    }
}
