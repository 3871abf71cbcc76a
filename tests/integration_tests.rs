use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use transit_snapshots::error::ReadError;
use transit_snapshots::fetch::HttpClient;
use transit_snapshots::ingest::{FailurePolicy, Ingestor};
use transit_snapshots::model::{EntityKind, EntityRecord, ObjectType};
use transit_snapshots::punctuality::{PunctualityAggregator, PunctualityLedger, SqlitePunctualityLedger};
use transit_snapshots::reader::SnapshotReader;
use transit_snapshots::reference::ReferenceCatalog;
use transit_snapshots::sources::{BusAdapter, RailAdapter, SourceAdapter, TramAdapter};
use transit_snapshots::store::{Database, ScanFilter, SnapshotStore, SqliteSnapshotStore, Table};

const RAIL: &str = "http://rail.test/realtime.asmx";
const STOPS: &str = "http://tram.test/luas-stops.txt";
const FORECAST: &str = "http://tram.test/xml/get.ashx";
const VEHICLES: &str = "http://bus.test/gtfsr/v2/Vehicles?format=json";

/// Serves fixture files by URL.
struct FixtureClient {
    routes: HashMap<String, &'static str>,
}

impl FixtureClient {
    fn new() -> Self {
        let mut routes = HashMap::new();
        let trains = |code: &str| format!("{RAIL}/getCurrentTrainsXML_WithTrainType?TrainType={code}");
        routes.insert(trains("M"), include_str!("fixtures/trains_mainline.xml"));
        routes.insert(trains("S"), include_str!("fixtures/trains_empty.xml"));
        routes.insert(trains("D"), include_str!("fixtures/trains_dart.xml"));
        routes.insert(STOPS.to_string(), include_str!("fixtures/luas-stops.txt"));
        routes.insert(
            format!("{FORECAST}?action=forecast&stop=ABB&encrypt=false"),
            include_str!("fixtures/forecast_abb.xml"),
        );
        routes.insert(VEHICLES.to_string(), include_str!("fixtures/vehicles.json"));
        Self { routes }
    }
}

#[async_trait]
impl HttpClient for FixtureClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        let resp = match self.routes.get(req.url().as_str()) {
            Some(body) => http::Response::builder().status(200).body(body.to_string()),
            None => http::Response::builder().status(404).body(String::new()),
        };
        Ok(reqwest::Response::from(resp.unwrap()))
    }
}

struct Service {
    transient: Arc<SqliteSnapshotStore>,
    permanent: Arc<SqliteSnapshotStore>,
    ledger: Arc<SqlitePunctualityLedger>,
}

impl Service {
    async fn new() -> Self {
        let db = Database::open_in_memory().unwrap();
        let permanent = Arc::new(SqliteSnapshotStore::new(db.clone(), Table::Permanent, 3));
        permanent.append(&[bus_route("4497_87340")]).await.unwrap();
        Self {
            transient: Arc::new(SqliteSnapshotStore::new(db.clone(), Table::Transient, 3)),
            permanent,
            ledger: Arc::new(SqlitePunctualityLedger::new(db)),
        }
    }

    fn ingestor(&self) -> Ingestor {
        let client: Arc<dyn HttpClient> = Arc::new(FixtureClient::new());
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(RailAdapter::new(client.clone(), RAIL)),
            Arc::new(TramAdapter::new(client.clone(), STOPS, FORECAST, 4)),
            Arc::new(BusAdapter::new(client, VEHICLES, "test-key").unwrap()),
        ];
        Ingestor::new(adapters, self.transient.clone(), self.permanent.clone())
    }
}

fn bus_route(id: &str) -> EntityRecord {
    let record = serde_json::json!({
        "objectID": format!("BusRoute-{id}"),
        "objectType": "BusRoute",
        "busRouteID": id,
        "busRouteAgencyID": "7778019",
        "busRouteAgencyName": "Dublin Bus",
        "busRouteShortName": "46A",
        "busRouteLongName": "Phoenix Park - Dun Laoghaire",
    });
    serde_json::from_value(record).unwrap()
}

fn bus<'a>(records: &'a [EntityRecord], id: &str) -> &'a transit_snapshots::model::BusVehicle {
    records
        .iter()
        .find_map(|r| match &r.kind {
            EntityKind::Bus(b) if b.bus_id == id => Some(b),
            _ => None,
        })
        .unwrap()
}

#[tokio::test]
async fn test_full_cycle_from_fixtures() {
    let service = Service::new().await;
    let report = service.ingestor().run_cycle_at(1740823800).await.unwrap();

    // 3 trains, 2 tram stops, 2 positioned buses
    assert_eq!(report.written, 7);
    assert_eq!(report.join_mismatches, 1);

    let snapshot = SnapshotReader::new(service.transient.clone())
        .latest(&[])
        .await
        .unwrap();
    assert_eq!(snapshot.timestamp, 1740823800);
    assert_eq!(snapshot.records.len(), 7);

    let known = bus(&snapshot.records, "V101");
    assert_eq!(known.route_agency_name, "Dublin Bus");
    assert_eq!(known.route_short_name, "46A");

    let unknown = bus(&snapshot.records, "V202");
    assert_eq!(unknown.route_agency_name, "");
    assert_eq!(unknown.route_long_name, "");

    let stops: Vec<_> = snapshot
        .records
        .iter()
        .filter_map(|r| match &r.kind {
            EntityKind::LuasStop(stop) => Some((stop.code.as_str(), stop.forecast.is_some())),
            _ => None,
        })
        .collect();
    assert_eq!(stops, vec![("ABB", true), ("TAL", false)]);
}

#[tokio::test]
async fn test_two_cycles_grow_the_store() {
    let service = Service::new().await;
    let ingestor = service.ingestor();

    let first = ingestor.run_cycle().await.unwrap();
    let second = ingestor.run_cycle().await.unwrap();
    assert_ne!(first.timestamp, second.timestamp);

    let all = service.transient.scan_all(&ScanFilter::default()).await.unwrap();
    assert_eq!(all.len(), first.written + second.written);

    let latest = SnapshotReader::new(service.transient.clone())
        .latest(&[ObjectType::Bus])
        .await
        .unwrap();
    assert_eq!(latest.timestamp, second.timestamp);
    assert_eq!(latest.records.len(), 2);
}

#[tokio::test]
async fn test_punctuality_after_ingest() {
    let service = Service::new().await;
    let ingestor = service.ingestor();
    let aggregator = PunctualityAggregator::new(service.transient.clone(), service.ledger.clone());

    ingestor.run_cycle_at(100).await.unwrap();
    let report = aggregator.run().await.unwrap();
    assert_eq!(report.timestamp, 100);
    assert_eq!(report.vehicles, 3);
    // (4 + -2 + 0) / 3
    assert_eq!(report.cycle_average, Some(Decimal::new(2, 0) / Decimal::new(3, 0)));

    ingestor.run_cycle_at(200).await.unwrap();
    aggregator.run().await.unwrap();
    assert!(aggregator.run().await.unwrap().already_applied);

    let state = service.ledger.state("IrishRailTrain-E109").await.unwrap().unwrap();
    assert_eq!(state.count, 2);
    assert_eq!(state.average_punctuality, Decimal::from(4));
    assert_eq!(service.ledger.cycle_averages().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_bus_feed_down_aborts_or_degrades() {
    let service = Service::new().await;
    let client: Arc<dyn HttpClient> = Arc::new(FixtureClient::new());
    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(RailAdapter::new(client.clone(), RAIL)),
        Arc::new(BusAdapter::new(client, "http://bus.test/down", "test-key").unwrap()),
    ];

    let abort = Ingestor::new(adapters.clone(), service.transient.clone(), service.permanent.clone());
    assert!(abort.run_cycle_at(100).await.is_err());
    assert!(matches!(
        SnapshotReader::new(service.transient.clone()).latest(&[]).await,
        Err(ReadError::EmptyResult)
    ));

    let partial = Ingestor::new(adapters, service.transient.clone(), service.permanent.clone())
        .with_policy(FailurePolicy::Partial);
    let report = partial.run_cycle_at(200).await.unwrap();
    assert_eq!(report.written, 3);
}

#[tokio::test]
async fn test_catalog_reads_permanent_routes() {
    let service = Service::new().await;
    let catalog = ReferenceCatalog::load(service.permanent.as_ref()).await.unwrap();
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.route("4497_87340").unwrap().long_name, "Phoenix Park - Dun Laoghaire");
}
