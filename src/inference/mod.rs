//! Rule-based mood inference
//!
//! `infer_mood` maps a derived feature row to a bounded mood score, a
//! confidence tier and an ordered list of explanations. It is pure, total and
//! deterministic.

pub mod rules;

use crate::types::{Confidence, DerivedFeatureRow, MoodEstimate};
use rules::GroupDeltas;

/// Score every prediction starts from
pub const BASELINE_MOOD: f64 = 3.0;

/// Revision tag of this rule set
pub const MODEL_VERSION: &str = "rules_v1";

const SLEEP_REASON: &str = "Sleep relative to baseline";
const CARDIO_REASON: &str = "Autonomic recovery indicators";
const STRESS_REASON: &str = "Stress level relative to baseline";
const ACTIVITY_REASON: &str = "Activity relative to baseline";

/// Infer mood from a derived feature row
pub fn infer_mood(row: &DerivedFeatureRow) -> MoodEstimate {
    let deltas = GroupDeltas::from_features(row);
    let score = rules::clamp(BASELINE_MOOD + deltas.total());

    MoodEstimate {
        mood: round_to_hundredths(score),
        // From the unrounded score, never from the 2-decimal value
        mood_discrete: score.round_ties_even() as u8,
        confidence: compute_confidence(row),
        explanation: explain(row, &deltas),
        model_version: MODEL_VERSION.to_string(),
    }
}

/// Confidence tier from the number of known features
pub fn compute_confidence(row: &DerivedFeatureRow) -> Confidence {
    match row.present_count() {
        n if n >= 5 => Confidence::High,
        n if n >= 3 => Confidence::Medium,
        _ => Confidence::Low,
    }
}

/// One line per group, in sleep, cardio, stress, activity order.
///
/// A group is explained when its lead sub-signal is known and the group's
/// total delta is non-zero; the displayed figure is the group total.
fn explain(row: &DerivedFeatureRow, deltas: &GroupDeltas) -> Vec<String> {
    [
        (row.sleep_debt_minutes.is_some(), deltas.sleep, SLEEP_REASON),
        (row.hrv_rmssd_zscore.is_some(), deltas.cardio, CARDIO_REASON),
        (row.stress_percentile.is_some(), deltas.stress, STRESS_REASON),
        (row.steps_vs_baseline_pct.is_some(), deltas.activity, ACTIVITY_REASON),
    ]
    .into_iter()
    .filter(|(known, delta, _)| *known && *delta != 0.0)
    .map(|(_, delta, reason)| format!("{reason} ({delta:+.1})"))
    .collect()
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn empty() -> DerivedFeatureRow {
        DerivedFeatureRow::empty(NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(), 28)
    }

    #[test]
    fn test_all_null_is_neutral() {
        let estimate = infer_mood(&empty());
        assert_eq!(estimate.mood, 3.0);
        assert_eq!(estimate.mood_discrete, 3);
        assert_eq!(estimate.confidence, Confidence::Low);
        assert!(estimate.explanation.is_empty());
        assert_eq!(estimate.model_version, "rules_v1");
    }

    #[test]
    fn test_sleep_surplus_scenario() {
        let row = DerivedFeatureRow {
            sleep_debt_minutes: Some(-10),
            sleep_vs_baseline_pct: Some(0.15),
            ..empty()
        };
        let estimate = infer_mood(&row);
        assert_eq!(estimate.mood, 3.6);
        assert_eq!(estimate.mood_discrete, 4);
        assert_eq!(estimate.confidence, Confidence::Low);
        assert_eq!(estimate.explanation, vec!["Sleep relative to baseline (+0.6)"]);
    }

    #[test]
    fn test_mixed_signal_scenario() {
        let row = DerivedFeatureRow {
            hrv_rmssd_zscore: Some(1.2),
            resting_hr_delta: Some(5.0),
            stress_percentile: Some(0.9),
            steps_vs_baseline_pct: Some(-0.25),
            ..empty()
        };
        let estimate = infer_mood(&row);
        assert_eq!(estimate.mood, 2.4);
        assert_eq!(estimate.mood_discrete, 2);
        assert_eq!(estimate.confidence, Confidence::Medium);
        assert_eq!(
            estimate.explanation,
            vec![
                "Autonomic recovery indicators (+0.2)",
                "Stress level relative to baseline (-0.6)",
                "Activity relative to baseline (-0.2)",
            ]
        );
    }

    #[test]
    fn test_group_without_lead_signal_is_not_explained() {
        let row = DerivedFeatureRow {
            sleep_vs_baseline_pct: Some(-0.3),
            active_minutes_delta: Some(25.0),
            ..empty()
        };
        let estimate = infer_mood(&row);
        assert_eq!(estimate.mood, 2.8);
        assert!(estimate.explanation.is_empty());
    }

    #[test]
    fn test_score_is_clamped() {
        let low = DerivedFeatureRow {
            sleep_debt_minutes: Some(200),
            sleep_vs_baseline_pct: Some(-0.5),
            hrv_rmssd_zscore: Some(-2.0),
            resting_hr_delta: Some(9.0),
            stress_percentile: Some(1.0),
            steps_vs_baseline_pct: Some(-0.6),
            active_minutes_delta: Some(-40.0),
            ..empty()
        };
        let estimate = infer_mood(&low);
        assert!(estimate.mood >= 1.0 && estimate.mood <= 5.0);
        assert_eq!(estimate.confidence, Confidence::High);

        let high = DerivedFeatureRow {
            sleep_debt_minutes: Some(-60),
            sleep_vs_baseline_pct: Some(0.3),
            hrv_rmssd_zscore: Some(2.0),
            resting_hr_delta: Some(-6.0),
            stress_percentile: Some(0.1),
            steps_vs_baseline_pct: Some(0.5),
            active_minutes_delta: Some(45.0),
            ..empty()
        };
        assert_eq!(infer_mood(&high).mood, 5.0);
        assert_eq!(infer_mood(&high).mood_discrete, 5);
    }

    #[test]
    fn test_deterministic() {
        let row = DerivedFeatureRow {
            hrv_rmssd_zscore: Some(-0.5),
            stress_percentile: Some(0.4),
            ..empty()
        };
        assert_eq!(infer_mood(&row), infer_mood(&row));
    }

    #[test]
    fn test_confidence_is_monotonic_in_known_features() {
        let setters: [fn(&mut DerivedFeatureRow); 7] = [
            |r| r.sleep_debt_minutes = Some(10),
            |r| r.sleep_vs_baseline_pct = Some(0.0),
            |r| r.hrv_rmssd_zscore = Some(0.0),
            |r| r.resting_hr_delta = Some(0.0),
            |r| r.stress_percentile = Some(0.5),
            |r| r.steps_vs_baseline_pct = Some(0.0),
            |r| r.active_minutes_delta = Some(0.0),
        ];

        // Grow the known set one feature at a time, in every rotation
        for start in 0..setters.len() {
            let mut row = empty();
            let mut previous = compute_confidence(&row);
            for i in 0..setters.len() {
                setters[(start + i) % setters.len()](&mut row);
                let current = compute_confidence(&row);
                assert!(current >= previous);
                previous = current;
            }
            assert_eq!(previous, Confidence::High);
        }
    }
}
