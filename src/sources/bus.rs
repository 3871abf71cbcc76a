use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::SourceAdapter;
use crate::error::{ParseError, SourceError};
use crate::fetch::{ApiKey, HttpClient, fetch_bytes_with};
use crate::model::{BusVehicle, EntityKind, EntityRecord};

#[derive(Debug, Deserialize)]
struct FeedMessage {
    #[serde(default)]
    entity: Vec<FeedEntity>,
}

#[derive(Debug, Deserialize)]
struct FeedEntity {
    id: String,
    vehicle: Option<VehiclePosition>,
}

#[derive(Debug, Deserialize)]
struct VehiclePosition {
    #[serde(default)]
    trip: TripDescriptor,
    position: Option<Position>,
}

#[derive(Debug, Default, Deserialize)]
struct TripDescriptor {
    trip_id: Option<Value>,
    start_time: Option<Value>,
    start_date: Option<Value>,
    schedule_relationship: Option<Value>,
    route_id: Option<Value>,
    direction_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Position {
    latitude: Value,
    longitude: Value,
}

/// Renders a JSON scalar the way it appears on the wire; absent or null is empty.
fn scalar(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Parses a GTFS-Realtime vehicle positions document (JSON encoding).
///
/// Route metadata is left empty here and filled in at merge time. Vehicles without
/// a position are skipped.
pub fn parse_vehicle_positions(json: &[u8], origin: &str) -> Result<Vec<EntityRecord>, ParseError> {
    let feed: FeedMessage =
        serde_json::from_slice(json).map_err(|e| ParseError::new("json", origin, e))?;

    let mut records = Vec::with_capacity(feed.entity.len());
    for entity in feed.entity {
        let Some(vehicle) = entity.vehicle else {
            debug!(entity = %entity.id, "Entity without vehicle, skipping");
            continue;
        };
        let Some(position) = vehicle.position else {
            debug!(entity = %entity.id, "Vehicle without position, skipping");
            continue;
        };
        let trip = vehicle.trip;

        records.push(
            EntityRecord::new(
                &entity.id,
                EntityKind::Bus(BusVehicle {
                    bus_id: entity.id.clone(),
                    trip_id: scalar(trip.trip_id.as_ref()),
                    start_time: scalar(trip.start_time.as_ref()),
                    start_date: scalar(trip.start_date.as_ref()),
                    schedule_relationship: scalar(trip.schedule_relationship.as_ref()),
                    route: scalar(trip.route_id.as_ref()),
                    route_agency_name: String::new(),
                    route_long_name: String::new(),
                    route_short_name: String::new(),
                    direction: scalar(trip.direction_id.as_ref()),
                }),
            )
            .at(
                scalar(Some(&position.latitude)),
                scalar(Some(&position.longitude)),
            ),
        );
    }
    Ok(records)
}

/// Bus vehicle positions from the national GTFS-Realtime API.
pub struct BusAdapter {
    client: ApiKey<Arc<dyn HttpClient>>,
    url: String,
}

impl BusAdapter {
    pub fn new(
        client: Arc<dyn HttpClient>,
        url: impl Into<String>,
        api_key: &str,
    ) -> Result<Self, SourceError> {
        if api_key.is_empty() {
            return Err(SourceError::Credential("GTFS_KEY"));
        }
        let client =
            ApiKey::x_api_key(client, api_key).map_err(|_| SourceError::Credential("GTFS_KEY"))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SourceAdapter for BusAdapter {
    fn name(&self) -> &'static str {
        "bus"
    }

    #[tracing::instrument(skip(self), fields(source = "bus"))]
    async fn fetch(&self) -> Result<Vec<EntityRecord>, SourceError> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let body = fetch_bytes_with(&self.client, &self.url, headers).await?;
        let records = parse_vehicle_positions(&body, &self.url)?;
        info!(records = records.len(), "Bus positions fetched");
        Ok(records)
    }
}
