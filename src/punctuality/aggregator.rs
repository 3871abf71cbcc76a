use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use super::{CycleAverage, PunctualityLedger, PunctualityState};
use crate::error::AggregateError;
use crate::model::{EntityKind, EntityRecord, ObjectType};
use crate::reader::SnapshotReader;
use crate::store::SnapshotStore;

/// Outcome of one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub timestamp: i64,
    pub vehicles: usize,
    pub cycle_average: Option<Decimal>,
    /// The cycle had been folded in by an earlier run; nothing was written.
    pub already_applied: bool,
}

/// Folds the latest rail snapshot into the punctuality ledger.
pub struct PunctualityAggregator {
    reader: SnapshotReader,
    ledger: Arc<dyn PunctualityLedger>,
}

impl PunctualityAggregator {
    pub fn new(transient: Arc<dyn SnapshotStore>, ledger: Arc<dyn PunctualityLedger>) -> Self {
        Self {
            reader: SnapshotReader::new(transient),
            ledger,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn run(&self) -> Result<AggregateReport, AggregateError> {
        let snapshot = self.reader.latest(&[ObjectType::IrishRailTrain]).await?;
        self.update(&snapshot.records).await
    }

    /// Applies one cycle of rail records. Every record must carry the same cycle
    /// timestamp; a snapshot missing one or mixing cycles is rejected before anything
    /// is written.
    pub async fn update(&self, records: &[EntityRecord]) -> Result<AggregateReport, AggregateError> {
        let timestamp = cycle_timestamp(records)?;

        if self.ledger.cycle_average(timestamp).await?.is_some() {
            info!(timestamp, "Cycle already aggregated, skipping");
            return Ok(AggregateReport {
                timestamp,
                vehicles: 0,
                cycle_average: None,
                already_applied: true,
            });
        }

        let mut values = Vec::with_capacity(records.len());
        for record in records {
            let EntityKind::IrishRailTrain(train) = &record.kind else {
                continue;
            };
            let value = Decimal::from(train.train_punctuality);
            values.push(value);

            let state = match self.ledger.state(&record.object_id).await? {
                Some(mut state) => {
                    state.observe(value);
                    state
                }
                None => PunctualityState::first(record.object_id.clone(), value),
            };
            debug!(
                object_id = %state.object_id,
                average = %state.average_punctuality,
                count = state.count,
                "Punctuality state updated"
            );
            self.ledger.put_state(&state).await?;
        }

        let cycle_average = CycleAverage::from_values(timestamp, &values);
        if let Some(average) = &cycle_average {
            self.ledger.insert_cycle_average(average).await?;
        }

        let report = AggregateReport {
            timestamp,
            vehicles: values.len(),
            cycle_average: cycle_average.map(|a| a.average_punctuality),
            already_applied: false,
        };
        info!(
            timestamp,
            vehicles = report.vehicles,
            cycle_average = ?report.cycle_average,
            "Punctuality aggregated"
        );
        Ok(report)
    }
}

fn cycle_timestamp(records: &[EntityRecord]) -> Result<i64, AggregateError> {
    let expected = records
        .first()
        .and_then(|r| r.timestamp)
        .ok_or(AggregateError::MissingTimestamp)?;
    for record in records {
        match record.timestamp {
            None => return Err(AggregateError::MissingTimestamp),
            Some(found) if found != expected => {
                return Err(AggregateError::MixedTimestamps { expected, found });
            }
            Some(_) => {}
        }
    }
    Ok(expected)
}
