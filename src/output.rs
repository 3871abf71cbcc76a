//! Output formatting for ingestion cycles.
//!
//! Supports pretty-printing, JSON serialization, and a CSV log of cycle summaries.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::ingest::CycleReport;
use crate::model::EntityRecord;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// One CSV row per cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub timestamp: i64,
    pub sources_ok: usize,
    pub sources_failed: usize,
    pub failed_sources: String,
    pub written: usize,
    pub join_mismatches: usize,
}

impl From<&CycleReport> for CycleSummary {
    fn from(report: &CycleReport) -> Self {
        let failed: Vec<&str> = report
            .outcomes
            .iter()
            .filter(|o| !o.is_ok())
            .map(|o| o.source)
            .collect();
        Self {
            timestamp: report.timestamp,
            sources_ok: report.outcomes.len() - failed.len(),
            sources_failed: failed.len(),
            failed_sources: failed.join(";"),
            written: report.written,
            join_mismatches: report.join_mismatches,
        }
    }
}

/// Logs a cycle report using Rust's debug pretty-print format.
pub fn print_pretty(report: &CycleReport) {
    debug!("{:#?}", report);
}

/// Writes records to stdout as pretty-printed JSON.
pub fn print_json(records: &[EntityRecord]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(records)?);
    info!(records = records.len(), "Records printed");
    Ok(())
}

/// Appends a cycle summary as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_summary(path: &str, report: &CycleReport) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, "Appending cycle summary");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    writer.serialize(CycleSummary::from(report))?;
    writer.flush()?;

    Ok(())
}
