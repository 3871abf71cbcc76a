use std::str::FromStr;

use async_trait::async_trait;
use rusqlite::{OptionalExtension, params};
use rust_decimal::Decimal;

use super::{CycleAverage, PunctualityState};
use crate::error::{StoreError, StoreResult};
use crate::store::Database;

/// Storage for the running punctuality statistics.
///
/// There is no compare-and-swap: two writers updating the same `objectID` race on
/// read-then-write, so callers must run one aggregation per cycle at a time.
#[async_trait]
pub trait PunctualityLedger: Send + Sync {
    async fn state(&self, object_id: &str) -> StoreResult<Option<PunctualityState>>;

    async fn put_state(&self, state: &PunctualityState) -> StoreResult<()>;

    async fn cycle_average(&self, timestamp: i64) -> StoreResult<Option<CycleAverage>>;

    /// Stores `average` unless one exists for that cycle. Returns whether it was written.
    async fn insert_cycle_average(&self, average: &CycleAverage) -> StoreResult<bool>;

    async fn states(&self) -> StoreResult<Vec<PunctualityState>>;

    async fn cycle_averages(&self) -> StoreResult<Vec<CycleAverage>>;
}

pub struct SqlitePunctualityLedger {
    db: Database,
}

impl SqlitePunctualityLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn parse_decimal(raw: &str) -> StoreResult<Decimal> {
    Decimal::from_str(raw).map_err(|e| StoreError::Corrupt(format!("{raw:?}: {e}")))
}

fn to_count(raw: i64) -> StoreResult<u64> {
    u64::try_from(raw).map_err(|_| StoreError::Corrupt(format!("negative count {raw}")))
}

#[async_trait]
impl PunctualityLedger for SqlitePunctualityLedger {
    async fn state(&self, object_id: &str) -> StoreResult<Option<PunctualityState>> {
        let object_id = object_id.to_string();
        self.db
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT average_punctuality, count FROM punctuality_by_object_id \
                         WHERE object_id = ?1",
                        [&object_id],
                        |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                    )
                    .optional()?;

                row.map(|(avg, count)| -> StoreResult<PunctualityState> {
                    Ok(PunctualityState {
                        object_id,
                        average_punctuality: parse_decimal(&avg)?,
                        count: to_count(count)?,
                    })
                })
                .transpose()
            })
            .await
    }

    async fn put_state(&self, state: &PunctualityState) -> StoreResult<()> {
        let state = state.clone();
        let count = i64::try_from(state.count)
            .map_err(|_| StoreError::Corrupt(format!("count overflow {}", state.count)))?;
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO punctuality_by_object_id (object_id, average_punctuality, count) \
                     VALUES (?1, ?2, ?3) \
                     ON CONFLICT (object_id) DO UPDATE SET \
                     average_punctuality = excluded.average_punctuality, count = excluded.count",
                    params![state.object_id, state.average_punctuality.to_string(), count],
                )?;
                Ok(())
            })
            .await
    }

    async fn cycle_average(&self, timestamp: i64) -> StoreResult<Option<CycleAverage>> {
        self.db
            .call(move |conn| {
                let avg = conn
                    .query_row(
                        "SELECT average_punctuality FROM punctuality_by_timestamp \
                         WHERE timestamp = ?1",
                        [timestamp],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;

                avg.map(|avg| -> StoreResult<CycleAverage> {
                    Ok(CycleAverage {
                        timestamp,
                        average_punctuality: parse_decimal(&avg)?,
                    })
                })
                .transpose()
            })
            .await
    }

    async fn insert_cycle_average(&self, average: &CycleAverage) -> StoreResult<bool> {
        let timestamp = average.timestamp;
        let avg = average.average_punctuality.to_string();
        self.db
            .call(move |conn| {
                let changed = conn.execute(
                    "INSERT OR IGNORE INTO punctuality_by_timestamp (timestamp, average_punctuality) \
                     VALUES (?1, ?2)",
                    params![timestamp, avg],
                )?;
                Ok(changed == 1)
            })
            .await
    }

    async fn states(&self) -> StoreResult<Vec<PunctualityState>> {
        self.db
            .call(|conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT object_id, average_punctuality, count FROM punctuality_by_object_id \
                     ORDER BY object_id",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                rows.into_iter()
                    .map(|(object_id, avg, count)| {
                        Ok(PunctualityState {
                            object_id,
                            average_punctuality: parse_decimal(&avg)?,
                            count: to_count(count)?,
                        })
                    })
                    .collect()
            })
            .await
    }

    async fn cycle_averages(&self) -> StoreResult<Vec<CycleAverage>> {
        self.db
            .call(|conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT timestamp, average_punctuality FROM punctuality_by_timestamp \
                     ORDER BY timestamp",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                rows.into_iter()
                    .map(|(timestamp, avg)| {
                        Ok(CycleAverage {
                            timestamp,
                            average_punctuality: parse_decimal(&avg)?,
                        })
                    })
                    .collect()
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> SqlitePunctualityLedger {
        SqlitePunctualityLedger::new(Database::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_missing_state_is_none() {
        assert!(ledger().state("IrishRailTrain-X").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_then_read_state_keeps_exact_decimal() {
        let ledger = ledger();
        let mut state = PunctualityState::first("IrishRailTrain-A1", Decimal::from(1));
        state.observe(Decimal::from(2));
        state.observe(Decimal::from(2));
        ledger.put_state(&state).await.unwrap();

        let stored = ledger.state("IrishRailTrain-A1").await.unwrap().unwrap();
        assert_eq!(stored, state);
        assert_eq!(stored.count, 3);
    }

    #[tokio::test]
    async fn test_put_state_overwrites() {
        let ledger = ledger();
        let mut state = PunctualityState::first("IrishRailTrain-A1", Decimal::from(4));
        ledger.put_state(&state).await.unwrap();
        state.observe(Decimal::from(6));
        ledger.put_state(&state).await.unwrap();

        let states = ledger.states().await.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].average_punctuality, Decimal::from(5));
    }

    #[tokio::test]
    async fn test_cycle_average_is_written_once() {
        let ledger = ledger();
        let first = CycleAverage {
            timestamp: 100,
            average_punctuality: Decimal::from(3),
        };
        let second = CycleAverage {
            timestamp: 100,
            average_punctuality: Decimal::from(9),
        };

        assert!(ledger.insert_cycle_average(&first).await.unwrap());
        assert!(!ledger.insert_cycle_average(&second).await.unwrap());

        let stored = ledger.cycle_average(100).await.unwrap().unwrap();
        assert_eq!(stored.average_punctuality, Decimal::from(3));
        assert_eq!(ledger.cycle_averages().await.unwrap().len(), 1);
    }
}
