//! Record shapes shared by every feed, the stores and the read API.
//!
//! Every observation is an [`EntityRecord`]: identity, optional cycle timestamp and
//! position, plus an [`EntityKind`] carrying only the fields valid for its
//! `objectType`. JSON field names match the wire names served to clients.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::punctuality::PunctualityStatus;

/// The closed set of tracked object kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectType {
    IrishRailTrain,
    LuasStop,
    Bus,
    BusRoute,
    BusAgency,
    BusStop,
    IrishRailStation,
}

impl ObjectType {
    pub const ALL: [ObjectType; 7] = [
        ObjectType::IrishRailTrain,
        ObjectType::LuasStop,
        ObjectType::Bus,
        ObjectType::BusRoute,
        ObjectType::BusAgency,
        ObjectType::BusStop,
        ObjectType::IrishRailStation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::IrishRailTrain => "IrishRailTrain",
            ObjectType::LuasStop => "LuasStop",
            ObjectType::Bus => "Bus",
            ObjectType::BusRoute => "BusRoute",
            ObjectType::BusAgency => "BusAgency",
            ObjectType::BusStop => "BusStop",
            ObjectType::IrishRailStation => "IrishRailStation",
        }
    }

    /// Builds the `objectID` for an entity of this kind, e.g. `Bus-123`.
    pub fn object_id(&self, key: &str) -> String {
        format!("{}-{}", self.as_str(), key)
    }

    /// Whether records of this kind are grouped into timestamped cycles.
    pub fn is_time_series(&self) -> bool {
        matches!(
            self,
            ObjectType::IrishRailTrain | ObjectType::LuasStop | ObjectType::Bus
        )
    }

    /// Parses a comma-separated filter such as `"Bus,LuasStop"`. Blank entries are ignored.
    pub fn parse_list(raw: &str) -> Result<Vec<ObjectType>, UnknownObjectType> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown object type: {0}")]
pub struct UnknownObjectType(pub String);

impl FromStr for ObjectType {
    type Err = UnknownObjectType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownObjectType(s.to_string()))
    }
}

/// One observation of one tracked thing, optionally at one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    #[serde(rename = "objectID")]
    pub object_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<String>,
    #[serde(flatten)]
    pub kind: EntityKind,
}

impl EntityRecord {
    /// Creates an unstamped record; the object id is derived from the kind and `key`.
    pub fn new(key: &str, kind: EntityKind) -> Self {
        Self {
            object_id: kind.object_type().object_id(key),
            timestamp: None,
            latitude: None,
            longitude: None,
            kind,
        }
    }

    pub fn at(mut self, latitude: impl Into<String>, longitude: impl Into<String>) -> Self {
        self.latitude = Some(latitude.into());
        self.longitude = Some(longitude.into());
        self
    }

    pub fn object_type(&self) -> ObjectType {
        self.kind.object_type()
    }

    /// Storage key: the object id alone for reference kinds, `objectID#timestamp` otherwise.
    pub fn record_key(&self) -> String {
        match self.timestamp {
            Some(ts) if self.object_type().is_time_series() => format!("{}#{}", self.object_id, ts),
            _ => self.object_id.clone(),
        }
    }

    pub fn coordinates(&self) -> Option<[&str; 2]> {
        match (&self.latitude, &self.longitude) {
            (Some(lat), Some(lon)) => Some([lat.as_str(), lon.as_str()]),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "objectType")]
pub enum EntityKind {
    IrishRailTrain(RailVehicle),
    LuasStop(TramStop),
    Bus(BusVehicle),
    BusRoute(BusRoute),
    BusAgency(BusAgency),
    BusStop(BusStop),
    IrishRailStation(RailStation),
}

impl EntityKind {
    pub fn object_type(&self) -> ObjectType {
        match self {
            EntityKind::IrishRailTrain(_) => ObjectType::IrishRailTrain,
            EntityKind::LuasStop(_) => ObjectType::LuasStop,
            EntityKind::Bus(_) => ObjectType::Bus,
            EntityKind::BusRoute(_) => ObjectType::BusRoute,
            EntityKind::BusAgency(_) => ObjectType::BusAgency,
            EntityKind::BusStop(_) => ObjectType::BusStop,
            EntityKind::IrishRailStation(_) => ObjectType::IrishRailStation,
        }
    }
}

/// Rail service category, also used for station categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RailCategory {
    #[serde(rename = "M")]
    Mainline,
    #[serde(rename = "S")]
    Suburban,
    #[serde(rename = "D")]
    Dart,
}

impl RailCategory {
    pub const ALL: [RailCategory; 3] = [
        RailCategory::Mainline,
        RailCategory::Suburban,
        RailCategory::Dart,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            RailCategory::Mainline => "M",
            RailCategory::Suburban => "S",
            RailCategory::Dart => "D",
        }
    }

    pub fn full_name(&self) -> &'static str {
        match self {
            RailCategory::Mainline => "Mainline",
            RailCategory::Suburban => "Suburban",
            RailCategory::Dart => "DART",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RailVehicle {
    pub train_code: String,
    pub train_type: RailCategory,
    pub train_type_full: String,
    pub train_status: String,
    pub train_status_full: String,
    pub train_date: String,
    pub train_public_message: String,
    pub train_direction: String,
    pub train_punctuality: i64,
    pub train_punctuality_status: PunctualityStatus,
    pub lateness_message: String,
    pub train_details: String,
    pub train_update: String,
}

/// Full name for a single-letter running status.
pub fn train_status_full(code: &str) -> &'static str {
    match code {
        "R" => "Running",
        "T" => "Terminated",
        "N" => "Not yet running",
        _ => "Unknown",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TramStop {
    #[serde(rename = "luasStopName")]
    pub name: String,
    #[serde(rename = "luasStopIrishName")]
    pub irish_name: String,
    #[serde(rename = "luasStopID")]
    pub stop_id: String,
    #[serde(rename = "luasStopCode")]
    pub code: String,
    #[serde(rename = "luasStopLineID")]
    pub line_id: String,
    #[serde(rename = "luasStopSortOrder")]
    pub sort_order: String,
    #[serde(rename = "luasStopIsEnabled")]
    pub is_enabled: String,
    #[serde(rename = "luasStopIsParkAndRide")]
    pub is_park_and_ride: String,
    #[serde(rename = "luasStopIsCycleAndRide")]
    pub is_cycle_and_ride: String,
    #[serde(rename = "luasStopZoneCountA")]
    pub zone_count_a: String,
    #[serde(rename = "luasStopZoneCountB")]
    pub zone_count_b: String,
    #[serde(
        rename = "luasStopForecast",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub forecast: Option<StopForecast>,
}

/// Upcoming trams at one stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopForecast {
    pub message: String,
    pub directions: Vec<ForecastDirection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDirection {
    pub name: String,
    pub trams: Vec<ForecastTram>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastTram {
    pub destination: String,
    pub due_mins: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusVehicle {
    #[serde(rename = "busID")]
    pub bus_id: String,
    #[serde(rename = "busTripID")]
    pub trip_id: String,
    #[serde(rename = "busStartTime")]
    pub start_time: String,
    #[serde(rename = "busStartDate")]
    pub start_date: String,
    #[serde(rename = "busScheduleRelationship")]
    pub schedule_relationship: String,
    #[serde(rename = "busRoute")]
    pub route: String,
    #[serde(rename = "busRouteAgencyName")]
    pub route_agency_name: String,
    #[serde(rename = "busRouteLongName")]
    pub route_long_name: String,
    #[serde(rename = "busRouteShortName")]
    pub route_short_name: String,
    #[serde(rename = "busDirection")]
    pub direction: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusRoute {
    #[serde(rename = "busRouteID")]
    pub route_id: String,
    #[serde(rename = "busRouteAgencyID")]
    pub agency_id: String,
    #[serde(rename = "busRouteAgencyName", default)]
    pub agency_name: Option<String>,
    #[serde(rename = "busRouteShortName")]
    pub short_name: String,
    #[serde(rename = "busRouteLongName")]
    pub long_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusAgency {
    #[serde(rename = "busAgencyID")]
    pub agency_id: String,
    #[serde(rename = "busAgencyName")]
    pub name: String,
    #[serde(rename = "busAgencyURL")]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusStop {
    #[serde(rename = "busStopID")]
    pub stop_id: String,
    #[serde(rename = "busStopCode")]
    pub code: String,
    #[serde(rename = "busStopName")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RailStation {
    #[serde(rename = "trainStationID")]
    pub station_id: String,
    #[serde(rename = "trainStationCode")]
    pub code: String,
    #[serde(rename = "trainStationAlias")]
    pub alias: String,
    #[serde(rename = "trainStationDesc")]
    pub description: String,
    #[serde(
        rename = "trainStationType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub station_type: Option<RailCategory>,
}
