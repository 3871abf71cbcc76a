use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use async_zip::base::read::mem::ZipFileReader;
use async_zip::error::ZipError;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::SourceAdapter;
use crate::error::{ParseError, SourceError};
use crate::fetch::{HttpClient, fetch_bytes, strip_bom};
use crate::model::{BusAgency, BusRoute, BusStop, EntityKind, EntityRecord};

#[derive(Debug, Deserialize)]
struct Agency {
    #[serde(default)]
    agency_id: String,
    agency_name: String,
    #[serde(default)]
    agency_url: String,
}

#[derive(Debug, Deserialize)]
struct Route {
    route_id: String,
    #[serde(default)]
    agency_id: String,
    #[serde(default)]
    route_short_name: String,
    #[serde(default)]
    route_long_name: String,
}

#[derive(Debug, Deserialize)]
struct Stop {
    stop_id: String,
    #[serde(default)]
    stop_code: String,
    #[serde(default)]
    stop_name: String,
    #[serde(default)]
    stop_lat: String,
    #[serde(default)]
    stop_lon: String,
}

fn read_csv<T: DeserializeOwned>(text: &str, origin: &str) -> Result<Vec<T>, ParseError> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(strip_bom(text).as_bytes())
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| ParseError::new("csv", origin, e))
}

/// Reads the agency, route and stop tables out of a GTFS archive held in memory.
async fn read_tables(bytes: Vec<u8>, origin: &str) -> Result<HashMap<String, String>, ParseError> {
    let zip_error = |e: ZipError| ParseError::new("zip", origin, e);
    let zip = ZipFileReader::new(bytes).await.map_err(zip_error)?;

    let mut tables = HashMap::new();
    for idx in 0..usize::MAX {
        let mut reader = match zip.reader_with_entry(idx).await {
            Ok(entry) => entry,
            Err(ZipError::EntryIndexOutOfBounds) => break,
            Err(e) => return Err(zip_error(e)),
        };

        let filename = reader
            .entry()
            .filename()
            .clone()
            .into_string()
            .map_err(zip_error)?;
        let table = match filename.as_str() {
            "agency.txt" | "agencies.txt" => "agency",
            "routes.txt" => "routes",
            "stops.txt" => "stops",
            _ => {
                debug!(filename, "Skipping");
                continue;
            }
        };

        let mut text = String::new();
        reader
            .read_to_string_checked(&mut text)
            .await
            .map_err(zip_error)?;
        tables.insert(table.to_string(), text);
    }
    Ok(tables)
}

/// Parses a GTFS static archive into agency, route and stop reference records.
///
/// Routes carry the name of their agency when the agency is known. Missing tables
/// yield no records.
pub async fn parse_gtfs_archive(bytes: Vec<u8>, origin: &str) -> Result<Vec<EntityRecord>, ParseError> {
    let tables = read_tables(bytes, origin).await?;
    let table = |name: &str| tables.get(name).map(String::as_str).unwrap_or_default();

    let agencies: Vec<Agency> = read_csv(table("agency"), origin)?;
    let routes: Vec<Route> = read_csv(table("routes"), origin)?;
    let stops: Vec<Stop> = read_csv(table("stops"), origin)?;

    let agency_names: HashMap<&str, &str> = agencies
        .iter()
        .map(|a| (a.agency_id.as_str(), a.agency_name.as_str()))
        .collect();

    let mut records = Vec::with_capacity(agencies.len() + routes.len() + stops.len());
    for route in &routes {
        records.push(EntityRecord::new(
            &route.route_id,
            EntityKind::BusRoute(BusRoute {
                route_id: route.route_id.clone(),
                agency_id: route.agency_id.clone(),
                agency_name: agency_names
                    .get(route.agency_id.as_str())
                    .map(|name| name.to_string()),
                short_name: route.route_short_name.clone(),
                long_name: route.route_long_name.clone(),
            }),
        ));
    }
    let route_count = records.len();

    for agency in agencies {
        records.push(EntityRecord::new(
            &agency.agency_id,
            EntityKind::BusAgency(BusAgency {
                agency_id: agency.agency_id.clone(),
                name: agency.agency_name,
                url: agency.agency_url,
            }),
        ));
    }
    let agency_count = records.len() - route_count;

    for stop in stops {
        records.push(
            EntityRecord::new(
                &stop.stop_id,
                EntityKind::BusStop(BusStop {
                    stop_id: stop.stop_id.clone(),
                    code: stop.stop_code,
                    name: stop.stop_name,
                }),
            )
            .at(stop.stop_lat, stop.stop_lon),
        );
    }

    info!(
        agencies = agency_count,
        routes = route_count,
        stops = records.len() - route_count - agency_count,
        "GTFS archive parsed"
    );
    Ok(records)
}

/// Bus reference data from the GTFS static archive.
pub struct GtfsStaticAdapter {
    client: Arc<dyn HttpClient>,
    url: String,
}

impl GtfsStaticAdapter {
    pub fn new(client: Arc<dyn HttpClient>, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl SourceAdapter for GtfsStaticAdapter {
    fn name(&self) -> &'static str {
        "gtfs_static"
    }

    #[tracing::instrument(skip(self), fields(source = "gtfs_static", url = %self.url))]
    async fn fetch(&self) -> Result<Vec<EntityRecord>, SourceError> {
        let bytes = fetch_bytes(self.client.as_ref(), &self.url).await?;
        debug!(bytes = bytes.len(), "GTFS archive downloaded");
        Ok(parse_gtfs_archive(bytes, &self.url).await?)
    }
}
