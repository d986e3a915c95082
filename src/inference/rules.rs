//! Threshold bands for each feature group
//!
//! Each group is a small monotonic step function over its sub-signals. A
//! missing sub-signal contributes exactly 0.

use crate::types::DerivedFeatureRow;

pub const MIN_MOOD: f64 = 1.0;
pub const MAX_MOOD: f64 = 5.0;

pub fn clamp(value: f64) -> f64 {
    value.clamp(MIN_MOOD, MAX_MOOD)
}

pub fn sleep_debt(debt_minutes: Option<i64>) -> f64 {
    match debt_minutes {
        Some(d) if d <= 0 => 0.3,
        Some(d) if d <= 30 => 0.0,
        Some(d) if d <= 90 => -0.4,
        Some(_) => -0.8,
        None => 0.0,
    }
}

/// `pct` is a fraction (0.10 == ten percent)
pub fn sleep_vs_baseline(pct: Option<f64>) -> f64 {
    match pct {
        Some(p) if p >= 0.10 => 0.3,
        Some(p) if p <= -0.10 => -0.4,
        _ => 0.0,
    }
}

pub fn hrv_zscore(z: Option<f64>) -> f64 {
    match z {
        Some(z) if z >= 1.0 => 0.6,
        Some(z) if z >= 0.3 => 0.3,
        Some(z) if z <= -1.0 => -0.7,
        Some(z) if z <= -0.3 => -0.4,
        _ => 0.0,
    }
}

pub fn resting_hr_delta(delta: Option<f64>) -> f64 {
    match delta {
        Some(d) if d <= -3.0 => 0.3,
        Some(d) if d >= 3.0 => -0.4,
        _ => 0.0,
    }
}

pub fn stress_percentile(percentile: Option<f64>) -> f64 {
    match percentile {
        Some(p) if p <= 0.25 => 0.4,
        Some(p) if p <= 0.50 => 0.1,
        Some(p) if p <= 0.75 => -0.3,
        Some(_) => -0.6,
        None => 0.0,
    }
}

/// `pct` is a fraction (0.20 == twenty percent)
pub fn steps_vs_baseline(pct: Option<f64>) -> f64 {
    match pct {
        Some(p) if p >= 0.20 => 0.3,
        Some(p) if p <= -0.20 => -0.2,
        _ => 0.0,
    }
}

pub fn active_minutes_delta(delta: Option<f64>) -> f64 {
    match delta {
        Some(d) if d >= 20.0 => 0.2,
        Some(d) if d <= -20.0 => -0.2,
        _ => 0.0,
    }
}

/// Summed contribution of each feature group
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupDeltas {
    pub sleep: f64,
    pub cardio: f64,
    pub stress: f64,
    pub activity: f64,
}

impl GroupDeltas {
    pub fn from_features(row: &DerivedFeatureRow) -> Self {
        Self {
            sleep: sleep_debt(row.sleep_debt_minutes) + sleep_vs_baseline(row.sleep_vs_baseline_pct),
            cardio: hrv_zscore(row.hrv_rmssd_zscore) + resting_hr_delta(row.resting_hr_delta),
            stress: stress_percentile(row.stress_percentile),
            activity: steps_vs_baseline(row.steps_vs_baseline_pct)
                + active_minutes_delta(row.active_minutes_delta),
        }
    }

    pub fn total(&self) -> f64 {
        self.sleep + self.cardio + self.stress + self.activity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_edges() {
        assert_eq!(sleep_debt(Some(0)), 0.3);
        assert_eq!(sleep_debt(Some(30)), 0.0);
        assert_eq!(sleep_debt(Some(31)), -0.4);
        assert_eq!(sleep_debt(Some(90)), -0.4);
        assert_eq!(sleep_debt(Some(91)), -0.8);

        assert_eq!(hrv_zscore(Some(0.3)), 0.3);
        assert_eq!(hrv_zscore(Some(0.29)), 0.0);
        assert_eq!(hrv_zscore(Some(-0.3)), -0.4);
        assert_eq!(hrv_zscore(Some(-1.0)), -0.7);

        assert_eq!(stress_percentile(Some(0.25)), 0.4);
        assert_eq!(stress_percentile(Some(0.5)), 0.1);
        assert_eq!(stress_percentile(Some(0.75)), -0.3);
        assert_eq!(stress_percentile(Some(0.76)), -0.6);

        assert_eq!(steps_vs_baseline(Some(0.2)), 0.3);
        assert_eq!(steps_vs_baseline(Some(-0.19)), 0.0);
        assert_eq!(active_minutes_delta(Some(-20.0)), -0.2);
        assert_eq!(resting_hr_delta(Some(2.9)), 0.0);
    }

    #[test]
    fn test_missing_features_are_neutral() {
        let deltas = GroupDeltas::from_features(&DerivedFeatureRow::empty(
            chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            28,
        ));
        assert_eq!(deltas.total(), 0.0);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(0.2), MIN_MOOD);
        assert_eq!(clamp(5.3), MAX_MOOD);
        assert_eq!(clamp(3.3), 3.3);
    }
}
