//! Runtime settings read from the environment (after `.env` has been loaded).

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_IRISHRAIL_API_URL: &str = "http://api.irishrail.ie/realtime/realtime.asmx";
pub const DEFAULT_LUAS_STOPS_URL: &str =
    "https://data.tii.ie/Datasets/Luas/StopLocations/luas-stops.txt";
pub const DEFAULT_LUAS_FORECAST_URL: &str = "https://luasforecasts.rpa.ie/xml/get.ashx";
pub const DEFAULT_BUS_VEHICLES_URL: &str =
    "https://api.nationaltransport.ie/gtfsr/v2/Vehicles?format=json";
pub const DEFAULT_GTFS_ARCHIVE_URL: &str =
    "https://www.transportforireland.ie/transitData/Data/GTFS_All.zip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_path: String,
    /// API key for the bus feed. Only required when that feed is enabled.
    pub gtfs_key: Option<String>,
    pub http_timeout: Duration,
    pub http_connect_timeout: Duration,
    pub forecast_concurrency: usize,
    pub scan_page_size: usize,
    pub listen_address: String,
    pub irishrail_api_url: String,
    pub luas_stops_url: String,
    pub luas_forecast_url: String,
    pub bus_vehicles_url: String,
    pub gtfs_archive_url: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let string = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        Ok(Self {
            database_path: string("DATABASE_PATH", "transit.sqlite"),
            gtfs_key: var("GTFS_KEY"),
            http_timeout: Duration::from_secs(parse(&var, "HTTP_TIMEOUT_SECS", 30)?),
            http_connect_timeout: Duration::from_secs(parse(&var, "HTTP_CONNECT_TIMEOUT_SECS", 10)?),
            forecast_concurrency: positive(parse(&var, "FORECAST_CONCURRENCY", 8)?, "FORECAST_CONCURRENCY")?,
            scan_page_size: positive(parse(&var, "SCAN_PAGE_SIZE", 1000)?, "SCAN_PAGE_SIZE")?,
            listen_address: string("LISTEN_ADDRESS", "127.0.0.1:8080"),
            irishrail_api_url: string("IRISHRAIL_API_URL", DEFAULT_IRISHRAIL_API_URL),
            luas_stops_url: string("LUAS_STOPS_URL", DEFAULT_LUAS_STOPS_URL),
            luas_forecast_url: string("LUAS_FORECAST_URL", DEFAULT_LUAS_FORECAST_URL),
            bus_vehicles_url: string("BUS_VEHICLES_URL", DEFAULT_BUS_VEHICLES_URL),
            gtfs_archive_url: string("GTFS_ARCHIVE_URL", DEFAULT_GTFS_ARCHIVE_URL),
        })
    }
}

fn parse<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw.clone(),
            message: e.to_string(),
        }),
    }
}

fn positive(value: usize, name: &'static str) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            message: "must be at least 1".to_string(),
        });
    }
    Ok(value)
}
