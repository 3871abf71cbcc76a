use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, info, warn};

use super::SourceAdapter;
use crate::error::{ParseError, SourceError};
use crate::fetch::{HttpClient, fetch_text};
use crate::model::{EntityKind, EntityRecord, ForecastDirection, ForecastTram, StopForecast, TramStop};

/// One row of the tab-separated stop list. Extra columns are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawStop {
    name: String,
    #[serde(default)]
    irish_name: String,
    #[serde(rename = "StopID", default)]
    stop_id: String,
    abbreviation: String,
    #[serde(rename = "LineID", default)]
    line_id: String,
    #[serde(default)]
    sort_order: String,
    #[serde(default)]
    is_enabled: String,
    #[serde(default)]
    is_park_and_ride: String,
    #[serde(default)]
    is_cycle_and_ride: String,
    #[serde(default)]
    zone_count_a: String,
    #[serde(default)]
    zone_count_b: String,
    #[serde(default)]
    latitude: String,
    #[serde(default)]
    longitude: String,
}

#[derive(Debug, Deserialize)]
struct RawStopInfo {
    #[serde(default)]
    message: String,
    #[serde(rename = "direction", default)]
    directions: Vec<RawDirection>,
}

#[derive(Debug, Deserialize)]
struct RawDirection {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "tram", default)]
    trams: Vec<RawTram>,
}

#[derive(Debug, Deserialize)]
struct RawTram {
    #[serde(rename = "@destination", default)]
    destination: String,
    #[serde(rename = "@dueMins", default)]
    due_mins: String,
}

/// Parses the stop list. A leading byte order mark is tolerated.
pub fn parse_stop_list(tsv: &str, origin: &str) -> Result<Vec<EntityRecord>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(crate::fetch::strip_bom(tsv).as_bytes());

    let mut stops = Vec::new();
    for row in reader.deserialize::<RawStop>() {
        let raw = row.map_err(|e| ParseError::new("tsv", origin, e))?;
        stops.push(
            EntityRecord::new(
                &raw.abbreviation,
                EntityKind::LuasStop(TramStop {
                    name: raw.name,
                    irish_name: raw.irish_name,
                    stop_id: raw.stop_id,
                    code: raw.abbreviation.clone(),
                    line_id: raw.line_id,
                    sort_order: raw.sort_order,
                    is_enabled: raw.is_enabled,
                    is_park_and_ride: raw.is_park_and_ride,
                    is_cycle_and_ride: raw.is_cycle_and_ride,
                    zone_count_a: raw.zone_count_a,
                    zone_count_b: raw.zone_count_b,
                    forecast: None,
                }),
            )
            .at(raw.latitude, raw.longitude),
        );
    }
    Ok(stops)
}

/// Parses one `stopInfo` forecast document.
pub fn parse_forecast(xml: &str, origin: &str) -> Result<StopForecast, ParseError> {
    let info: RawStopInfo =
        quick_xml::de::from_str(xml).map_err(|e| ParseError::new("xml", origin, e))?;
    Ok(StopForecast {
        message: info.message.trim().to_string(),
        directions: info
            .directions
            .into_iter()
            .map(|d| ForecastDirection {
                name: d.name,
                trams: d
                    .trams
                    .into_iter()
                    .map(|t| ForecastTram {
                        destination: t.destination,
                        due_mins: t.due_mins,
                    })
                    .collect(),
            })
            .collect(),
    })
}

async fn fetch_forecast(client: &dyn HttpClient, url: &str) -> Result<StopForecast, SourceError> {
    let xml = fetch_text(client, url).await?;
    Ok(parse_forecast(&xml, url)?)
}

/// Light rail stops, optionally with a live forecast per stop.
pub struct TramAdapter {
    client: Arc<dyn HttpClient>,
    stops_url: String,
    forecast_url: String,
    concurrency: usize,
    with_forecasts: bool,
}

impl TramAdapter {
    pub fn new(
        client: Arc<dyn HttpClient>,
        stops_url: impl Into<String>,
        forecast_url: impl Into<String>,
        concurrency: usize,
    ) -> Self {
        Self {
            client,
            stops_url: stops_url.into(),
            forecast_url: forecast_url.into(),
            concurrency: concurrency.max(1),
            with_forecasts: true,
        }
    }

    /// Stop list only, for reference loading.
    pub fn stops_only(client: Arc<dyn HttpClient>, stops_url: impl Into<String>) -> Self {
        Self {
            client,
            stops_url: stops_url.into(),
            forecast_url: String::new(),
            concurrency: 1,
            with_forecasts: false,
        }
    }

    fn forecast_url(&self, stop_code: &str) -> String {
        format!(
            "{}?action=forecast&stop={}&encrypt=false",
            self.forecast_url, stop_code
        )
    }

    /// Fetches forecasts with at most `concurrency` requests in flight. A stop whose
    /// forecast fails is kept without one.
    async fn attach_forecasts(&self, stops: &mut [EntityRecord]) -> usize {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = Vec::with_capacity(stops.len());

        for stop in stops.iter() {
            let EntityKind::LuasStop(tram_stop) = &stop.kind else {
                tasks.push(None);
                continue;
            };
            let sem = semaphore.clone();
            let client = self.client.clone();
            let url = self.forecast_url(&tram_stop.code);
            let span = tracing::debug_span!("tram_forecast", stop = %tram_stop.code);

            let task = tokio::spawn(
                async move {
                    let Ok(_permit) = sem.acquire().await else {
                        return None;
                    };
                    match fetch_forecast(client.as_ref(), &url).await {
                        Ok(forecast) => Some(forecast),
                        Err(e) => {
                            warn!(error = %e, "Forecast unavailable, keeping stop without it");
                            None
                        }
                    }
                }
                .instrument(span),
            );
            tasks.push(Some(task));
        }

        let mut missing = 0;
        for (stop, task) in stops.iter_mut().zip(tasks) {
            let forecast = match task {
                Some(task) => task.await.unwrap_or_else(|e| {
                    warn!(error = %e, "Forecast task failed");
                    None
                }),
                None => None,
            };
            if forecast.is_none() {
                missing += 1;
            }
            if let EntityKind::LuasStop(tram_stop) = &mut stop.kind {
                tram_stop.forecast = forecast;
            }
        }
        missing
    }
}

#[async_trait]
impl SourceAdapter for TramAdapter {
    fn name(&self) -> &'static str {
        if self.with_forecasts { "tram" } else { "tram_stops" }
    }

    #[tracing::instrument(skip(self), fields(source = "tram", with_forecasts = self.with_forecasts))]
    async fn fetch(&self) -> Result<Vec<EntityRecord>, SourceError> {
        let tsv = fetch_text(self.client.as_ref(), &self.stops_url).await?;
        let mut stops = parse_stop_list(&tsv, &self.stops_url)?;
        debug!(stops = stops.len(), "Tram stop list parsed");

        if self.with_forecasts {
            let missing = self.attach_forecasts(&mut stops).await;
            info!(stops = stops.len(), missing_forecasts = missing, "Tram forecasts fetched");
        } else {
            info!(stops = stops.len(), "Tram stops fetched");
        }
        Ok(stops)
    }
}
