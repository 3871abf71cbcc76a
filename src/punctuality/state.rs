use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifetime running average for one tracked vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunctualityState {
    #[serde(rename = "objectID")]
    pub object_id: String,
    pub average_punctuality: Decimal,
    pub count: u64,
}

impl PunctualityState {
    pub fn first(object_id: impl Into<String>, value: Decimal) -> Self {
        Self {
            object_id: object_id.into(),
            average_punctuality: value,
            count: 1,
        }
    }

    /// Folds one more observation in: `(avg * n + value) / (n + 1)`.
    pub fn observe(&mut self, value: Decimal) {
        let n = Decimal::from(self.count);
        self.average_punctuality = (self.average_punctuality * n + value) / (n + Decimal::ONE);
        self.count += 1;
    }
}

/// Mean punctuality across every vehicle of one cycle. Written once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleAverage {
    pub timestamp: i64,
    pub average_punctuality: Decimal,
}

impl CycleAverage {
    /// Returns `None` for an empty cycle.
    pub fn from_values(timestamp: i64, values: &[Decimal]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let sum: Decimal = values.iter().sum();
        Some(Self {
            timestamp,
            average_punctuality: sum / Decimal::from(values.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_incremental_average_of_90_95_100() {
        let mut state = PunctualityState::first("IrishRailTrain-A1", Decimal::from(90));
        state.observe(Decimal::from(95));
        state.observe(Decimal::from(100));

        assert_eq!(state.average_punctuality, Decimal::from(95));
        assert_eq!(state.count, 3);
    }

    #[test]
    fn test_fractional_average_is_exact() {
        let mut state = PunctualityState::first("IrishRailTrain-A1", Decimal::from(1));
        state.observe(Decimal::from(2));
        assert_eq!(state.average_punctuality, Decimal::new(15, 1));
    }

    #[test]
    fn test_cycle_average() {
        let values = [90, 85, 80].map(Decimal::from);
        let avg = CycleAverage::from_values(1711814400, &values).unwrap();
        assert_eq!(avg.average_punctuality, Decimal::from(85));
        assert!(CycleAverage::from_values(1, &[]).is_none());
    }

    #[test]
    fn test_state_serializes_decimal_as_string() {
        let state = PunctualityState::first("IrishRailTrain-A1", Decimal::new(925, 1));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["objectID"], "IrishRailTrain-A1");
        assert_eq!(json["average_punctuality"], "92.5");
        assert_eq!(json["count"], 1);
    }

    proptest! {
        #[test]
        fn prop_incremental_matches_batch_mean(values in prop::collection::vec(-120i64..240, 1..60)) {
            let decimals: Vec<Decimal> = values.iter().copied().map(Decimal::from).collect();
            let mut state = PunctualityState::first("IrishRailTrain-P", decimals[0]);

            for (i, value) in decimals.iter().enumerate().skip(1) {
                state.observe(*value);
                let prefix = &decimals[..=i];
                let mean = prefix.iter().sum::<Decimal>() / Decimal::from(prefix.len());
                let drift = (state.average_punctuality - mean).abs();
                prop_assert!(drift < Decimal::new(1, 20), "drift {} at step {}", drift, i);
                prop_assert_eq!(state.count, prefix.len() as u64);
            }
        }
    }
}
