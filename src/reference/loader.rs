use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::sources::SourceAdapter;
use crate::store::SnapshotStore;

/// Record counts of one reference load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub stations: usize,
    pub tram_stops: usize,
    pub gtfs: usize,
    pub written: usize,
}

/// Fetches stations, tram stops and the GTFS static archive together and writes
/// them to the permanent store. Any feed failing fails the whole load.
pub struct ReferenceLoader {
    stations: Arc<dyn SourceAdapter>,
    tram_stops: Arc<dyn SourceAdapter>,
    gtfs: Arc<dyn SourceAdapter>,
    permanent: Arc<dyn SnapshotStore>,
}

impl ReferenceLoader {
    pub fn new(
        stations: Arc<dyn SourceAdapter>,
        tram_stops: Arc<dyn SourceAdapter>,
        gtfs: Arc<dyn SourceAdapter>,
        permanent: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            stations,
            tram_stops,
            gtfs,
            permanent,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn run(&self) -> anyhow::Result<LoadReport> {
        let (stations, tram_stops, gtfs) = tokio::try_join!(
            self.stations.fetch(),
            self.tram_stops.fetch(),
            self.gtfs.fetch(),
        )?;

        let mut report = LoadReport {
            stations: stations.len(),
            tram_stops: tram_stops.len(),
            gtfs: gtfs.len(),
            written: 0,
        };

        let records: Vec<_> = stations.into_iter().chain(tram_stops).chain(gtfs).collect();
        report.written = self.permanent.append(&records).await?;

        info!(
            stations = report.stations,
            tram_stops = report.tram_stops,
            gtfs = report.gtfs,
            written = report.written,
            "Reference data loaded"
        );
        Ok(report)
    }
}
