use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::SourceAdapter;
use crate::error::{ParseError, SourceError};
use crate::fetch::{HttpClient, fetch_text};
use crate::model::{EntityKind, EntityRecord, RailCategory, RailVehicle, train_status_full};
use crate::punctuality::Punctuality;

#[derive(Debug, Deserialize)]
struct ArrayOfObjTrainPositions {
    #[serde(rename = "objTrainPositions", default)]
    trains: Vec<RawTrain>,
}

#[derive(Debug, Deserialize)]
struct RawTrain {
    #[serde(rename = "TrainStatus", default)]
    status: String,
    #[serde(rename = "TrainLatitude", default)]
    latitude: String,
    #[serde(rename = "TrainLongitude", default)]
    longitude: String,
    #[serde(rename = "TrainCode")]
    code: String,
    #[serde(rename = "TrainDate", default)]
    date: String,
    #[serde(rename = "PublicMessage", default)]
    public_message: String,
    #[serde(rename = "Direction", default)]
    direction: String,
}

/// Returns `(trainDetails, trainUpdate)` from a public message.
///
/// Segments are separated by the two characters `\n` (as the feed sends them) or a
/// real newline. The details are the second segment up to its first `(`; the update
/// is the third segment. Missing segments come back empty.
pub fn split_public_message(message: &str) -> (String, String) {
    let normalized = message.replace("\\n", "\n");
    let segments: Vec<&str> = normalized.split('\n').collect();

    let details = segments
        .get(1)
        .and_then(|s| s.split('(').next())
        .unwrap_or_default()
        .trim()
        .to_string();
    let update = segments.get(2).map(|s| s.trim()).unwrap_or_default().to_string();
    (details, update)
}

fn normalize(raw: RawTrain, category: RailCategory) -> EntityRecord {
    let punctuality = Punctuality::parse(&raw.public_message);
    let (details, update) = split_public_message(&raw.public_message);

    EntityRecord::new(
        &raw.code,
        EntityKind::IrishRailTrain(RailVehicle {
            train_code: raw.code.clone(),
            train_type: category,
            train_type_full: category.full_name().to_string(),
            train_status_full: train_status_full(&raw.status).to_string(),
            train_status: raw.status,
            train_date: raw.date,
            train_direction: raw.direction,
            train_punctuality: punctuality.minutes,
            train_punctuality_status: punctuality.status(),
            lateness_message: punctuality.lateness_message(),
            train_public_message: raw.public_message,
            train_details: details,
            train_update: update,
        }),
    )
    .at(raw.latitude, raw.longitude)
}

/// Parses one `getCurrentTrainsXML_WithTrainType` response.
pub fn parse_train_positions(
    xml: &str,
    category: RailCategory,
    origin: &str,
) -> Result<Vec<EntityRecord>, ParseError> {
    let doc: ArrayOfObjTrainPositions =
        quick_xml::de::from_str(xml).map_err(|e| ParseError::new("xml", origin, e))?;
    Ok(doc
        .trains
        .into_iter()
        .map(|raw| normalize(raw, category))
        .collect())
}

/// Current train positions, one request per rail category.
pub struct RailAdapter {
    client: Arc<dyn HttpClient>,
    base_url: String,
}

impl RailAdapter {
    pub fn new(client: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, category: RailCategory) -> String {
        format!(
            "{}/getCurrentTrainsXML_WithTrainType?TrainType={}",
            self.base_url.trim_end_matches('/'),
            category.code()
        )
    }
}

#[async_trait]
impl SourceAdapter for RailAdapter {
    fn name(&self) -> &'static str {
        "rail"
    }

    #[tracing::instrument(skip(self), fields(source = "rail"))]
    async fn fetch(&self) -> Result<Vec<EntityRecord>, SourceError> {
        let mut records = Vec::new();
        for category in RailCategory::ALL {
            let url = self.url(category);
            let xml = fetch_text(self.client.as_ref(), &url).await?;
            let trains = parse_train_positions(&xml, category, &url)?;
            debug!(category = category.code(), trains = trains.len(), "Rail category parsed");
            records.extend(trains);
        }
        info!(records = records.len(), "Rail positions fetched");
        Ok(records)
    }
}
