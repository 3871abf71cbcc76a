use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{FetchError, SourceError};
use crate::model::{BusRoute, BusVehicle, EntityKind, EntityRecord, RailCategory, RailVehicle};
use crate::punctuality::Punctuality;
use crate::sources::SourceAdapter;

pub fn init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn train(code: &str, minutes_late: i64) -> EntityRecord {
    let punctuality = Punctuality::from_minutes(minutes_late);
    EntityRecord::new(
        code,
        EntityKind::IrishRailTrain(RailVehicle {
            train_code: code.to_string(),
            train_type: RailCategory::Dart,
            train_type_full: RailCategory::Dart.full_name().to_string(),
            train_status: "R".to_string(),
            train_status_full: "Running".to_string(),
            train_date: "01 Mar 2025".to_string(),
            train_public_message: format!("{code}\\nBray to Howth ({minutes_late} mins late)\\nDeparted Dalkey"),
            train_direction: "Northbound".to_string(),
            train_punctuality: punctuality.minutes,
            train_punctuality_status: punctuality.status(),
            lateness_message: punctuality.lateness_message(),
            train_details: "Bray to Howth".to_string(),
            train_update: "Departed Dalkey".to_string(),
        }),
    )
    .at("53.2", "-6.1")
}

pub fn bus(id: &str, route: &str) -> EntityRecord {
    EntityRecord::new(
        id,
        EntityKind::Bus(BusVehicle {
            bus_id: id.to_string(),
            trip_id: format!("{route}-trip"),
            start_time: "08:00:00".to_string(),
            start_date: "20250301".to_string(),
            schedule_relationship: "SCHEDULED".to_string(),
            route: route.to_string(),
            route_agency_name: String::new(),
            route_long_name: String::new(),
            route_short_name: String::new(),
            direction: "0".to_string(),
        }),
    )
    .at("53.35", "-6.26")
}

pub fn route(id: &str, agency_name: Option<&str>) -> EntityRecord {
    EntityRecord::new(
        id,
        EntityKind::BusRoute(BusRoute {
            route_id: id.to_string(),
            agency_id: "7778019".to_string(),
            agency_name: agency_name.map(str::to_string),
            short_name: format!("{id}s"),
            long_name: format!("{id} long"),
        }),
    )
}

pub fn stamped(records: Vec<EntityRecord>, timestamp: i64) -> Vec<EntityRecord> {
    records
        .into_iter()
        .map(|mut r| {
            r.timestamp = Some(timestamp);
            r
        })
        .collect()
}

/// Adapter returning fixed records, or a 503 when built with [`FakeAdapter::failing`].
pub struct FakeAdapter {
    name: &'static str,
    records: Vec<EntityRecord>,
    fail: bool,
}

impl FakeAdapter {
    pub fn ok(name: &'static str, records: Vec<EntityRecord>) -> Arc<Self> {
        Arc::new(Self {
            name,
            records,
            fail: false,
        })
    }

    pub fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            records: Vec::new(),
            fail: true,
        })
    }
}

#[async_trait]
impl SourceAdapter for FakeAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self) -> Result<Vec<EntityRecord>, SourceError> {
        if self.fail {
            return Err(FetchError::Status {
                url: format!("http://{}.test/", self.name),
                status: 503,
            }
            .into());
        }
        Ok(self.records.clone())
    }
}
