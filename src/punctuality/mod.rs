//! Punctuality: parsing it out of rail status text and keeping running averages.
//!
//! - [`Punctuality`] extracts signed minutes from a public message and classifies them.
//! - [`PunctualityState`] / [`CycleAverage`] are the running statistics.
//! - [`PunctualityLedger`] persists them; [`SqlitePunctualityLedger`] is the SQLite backend.
//! - [`PunctualityAggregator`] folds the latest rail snapshot into the ledger.

mod aggregator;
mod ledger;
mod state;

pub use aggregator::{AggregateReport, PunctualityAggregator};
pub use ledger::{PunctualityLedger, SqlitePunctualityLedger};
pub use state::{CycleAverage, PunctualityState};

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static MINS_LATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(-?\d+)\s+mins\s+late").expect("valid punctuality regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PunctualityStatus {
    Early,
    OnTime,
    Late,
}

/// Signed minutes of deviation from schedule: positive is late, negative is early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Punctuality {
    pub minutes: i64,
}

impl Punctuality {
    pub fn from_minutes(minutes: i64) -> Self {
        Self { minutes }
    }

    /// Finds the first `<n> mins late` in `message`. No match means on time.
    pub fn parse(message: &str) -> Self {
        let minutes = MINS_LATE
            .captures(message)
            .and_then(|c| c[1].parse::<i64>().ok())
            .unwrap_or(0);
        Self { minutes }
    }

    pub fn status(&self) -> PunctualityStatus {
        match self.minutes {
            m if m < 0 => PunctualityStatus::Early,
            0 => PunctualityStatus::OnTime,
            _ => PunctualityStatus::Late,
        }
    }

    pub fn lateness_message(&self) -> String {
        let magnitude = self.minutes.unsigned_abs();
        let unit = if magnitude == 1 { "minute" } else { "minutes" };
        match self.status() {
            PunctualityStatus::Early => format!("{magnitude} {unit} early"),
            PunctualityStatus::OnTime => "On time".to_string(),
            PunctualityStatus::Late => format!("{magnitude} {unit} late"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_late_message() {
        let p = Punctuality::parse("5 mins late");
        assert_eq!(p.minutes, 5);
        assert_eq!(p.status(), PunctualityStatus::Late);
        assert_eq!(p.lateness_message(), "5 minutes late");
    }

    #[test]
    fn test_early_message_is_singular() {
        let p = Punctuality::parse("-1 mins late");
        assert_eq!(p.minutes, -1);
        assert_eq!(p.status(), PunctualityStatus::Early);
        assert_eq!(p.lateness_message(), "1 minute early");
    }

    #[test]
    fn test_no_match_is_on_time() {
        let p = Punctuality::parse("E109\\nBray to Howth\\nExpected Departure 10:15");
        assert_eq!(p.minutes, 0);
        assert_eq!(p.status(), PunctualityStatus::OnTime);
        assert_eq!(p.lateness_message(), "On time");
    }

    #[test]
    fn test_embedded_in_public_message() {
        let message = "P607\\n09:50 - Maynooth to Grand Canal Dock (12 mins late)\\nArrived Broombridge next stop Pelletstown";
        assert_eq!(Punctuality::parse(message).minutes, 12);
    }

    #[test]
    fn test_singular_late_and_plural_early() {
        assert_eq!(Punctuality::from_minutes(1).lateness_message(), "1 minute late");
        assert_eq!(Punctuality::from_minutes(-3).lateness_message(), "3 minutes early");
    }

    #[test]
    fn test_status_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&PunctualityStatus::OnTime).unwrap(),
            "\"on-time\""
        );
        assert_eq!(
            serde_json::to_string(&PunctualityStatus::Early).unwrap(),
            "\"early\""
        );
    }
}
