use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::SourceAdapter;
use crate::error::{ParseError, SourceError};
use crate::fetch::{HttpClient, fetch_text};
use crate::model::{EntityKind, EntityRecord, RailCategory, RailStation};

#[derive(Debug, Deserialize)]
struct ArrayOfObjStation {
    #[serde(rename = "objStation", default)]
    stations: Vec<RawStation>,
}

#[derive(Debug, Deserialize)]
struct RawStation {
    #[serde(rename = "StationDesc", default)]
    description: String,
    #[serde(rename = "StationAlias", default)]
    alias: String,
    #[serde(rename = "StationLatitude", default)]
    latitude: String,
    #[serde(rename = "StationLongitude", default)]
    longitude: String,
    #[serde(rename = "StationCode")]
    code: String,
    #[serde(rename = "StationId", default)]
    id: String,
}

/// Parses a station list; `category` is set when the list was requested per type.
pub fn parse_stations(
    xml: &str,
    category: Option<RailCategory>,
    origin: &str,
) -> Result<Vec<EntityRecord>, ParseError> {
    let doc: ArrayOfObjStation =
        quick_xml::de::from_str(xml).map_err(|e| ParseError::new("xml", origin, e))?;
    Ok(doc
        .stations
        .into_iter()
        .map(|raw| {
            let code = raw.code.trim().to_string();
            EntityRecord::new(
                &code,
                EntityKind::IrishRailStation(RailStation {
                    station_id: raw.id,
                    code: code.clone(),
                    alias: raw.alias,
                    description: raw.description,
                    station_type: category,
                }),
            )
            .at(raw.latitude, raw.longitude)
        })
        .collect())
}

/// Rail station reference data.
///
/// The untyped list is complete. The per-type lists categorize stations but leave
/// out the ones the upstream API has not classified.
pub struct StationAdapter {
    client: Arc<dyn HttpClient>,
    base_url: String,
    with_types: bool,
}

impl StationAdapter {
    pub fn new(client: Arc<dyn HttpClient>, base_url: impl Into<String>, with_types: bool) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            with_types,
        }
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

#[async_trait]
impl SourceAdapter for StationAdapter {
    fn name(&self) -> &'static str {
        "stations"
    }

    #[tracing::instrument(skip(self), fields(source = "stations", with_types = self.with_types))]
    async fn fetch(&self) -> Result<Vec<EntityRecord>, SourceError> {
        let mut records = Vec::new();
        if self.with_types {
            for category in RailCategory::ALL {
                let url = format!(
                    "{}/getAllStationsXML_WithStationType?StationType={}",
                    self.base(),
                    category.code()
                );
                let xml = fetch_text(self.client.as_ref(), &url).await?;
                records.extend(parse_stations(&xml, Some(category), &url)?);
            }
        } else {
            let url = format!("{}/getAllStationsXML", self.base());
            let xml = fetch_text(self.client.as_ref(), &url).await?;
            records = parse_stations(&xml, None, &url)?;
        }
        info!(records = records.len(), "Rail stations fetched");
        Ok(records)
    }
}
