//! Upstream feed adapters.
//!
//! Each adapter fetches one feed through an injected [`HttpClient`] and normalizes
//! it into [`EntityRecord`]s without timestamps; stamping happens at merge time.
//!
//! [`HttpClient`]: crate::fetch::HttpClient

mod bus;
mod gtfs_static;
mod rail;
mod stations;
mod tram;

pub use bus::BusAdapter;
pub use gtfs_static::{GtfsStaticAdapter, parse_gtfs_archive};
pub use rail::{RailAdapter, parse_train_positions, split_public_message};
pub use stations::{StationAdapter, parse_stations};
pub use tram::{TramAdapter, parse_forecast, parse_stop_list};

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SourceError;
use crate::model::EntityRecord;

/// Live feeds polled every ingestion cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Rail,
    Tram,
    Bus,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Rail, Source::Tram, Source::Bus];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Rail => "rail",
            Source::Tram => "tram",
            Source::Bus => "bus",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Short name used in logs and cycle reports.
    fn name(&self) -> &'static str;

    async fn fetch(&self) -> Result<Vec<EntityRecord>, SourceError>;
}
