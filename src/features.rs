//! Feature derivation
//!
//! This module derives baseline-relative features for one (user, date):
//! - Sleep debt and sleep relative to baseline
//! - HRV z-score and resting heart rate delta
//! - Stress percentile within the baseline distribution
//! - Steps relative to baseline and active minutes delta
//!
//! The baseline is the calendar window `[date - window, date)`; the target day
//! never contributes to its own baseline. Every feature has its own
//! minimum-sample gate, and a failed gate yields `None`, never zero.

use crate::error::MoodError;
use crate::store::SignalStore;
use crate::types::{DaySignals, DerivedFeatureRow, UserId};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default baseline window in days
pub const DEFAULT_BASELINE_WINDOW_DAYS: u32 = 28;

/// Largest accepted baseline window (ten years)
pub const MAX_BASELINE_WINDOW_DAYS: u32 = 3650;

/// Window size and per-signal minimum baseline observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub baseline_window_days: u32,
    pub min_sleep_baseline_days: usize,
    pub min_hrv_baseline_days: usize,
    pub min_activity_baseline_days: usize,
    pub min_stress_baseline_days: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            baseline_window_days: DEFAULT_BASELINE_WINDOW_DAYS,
            min_sleep_baseline_days: 5,
            min_hrv_baseline_days: 10,
            min_activity_baseline_days: 5,
            min_stress_baseline_days: 5,
        }
    }
}

impl FeatureConfig {
    /// First day of the baseline window for `date`, clamped to the earliest representable date
    pub fn window_start(&self, date: NaiveDate) -> NaiveDate {
        date.checked_sub_days(Days::new(u64::from(self.baseline_window_days)))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Last day whose baseline can include `date`
    pub fn window_end(&self, date: NaiveDate) -> NaiveDate {
        date.checked_add_days(Days::new(u64::from(self.baseline_window_days)))
            .unwrap_or(NaiveDate::MAX)
    }
}

/// Feature deriver for computing baseline-relative features
pub struct FeatureDeriver;

impl FeatureDeriver {
    /// Derive features for `date` from its baseline days and (optionally) the day itself.
    ///
    /// `baseline` must already be restricted to the window; values outside it
    /// are not filtered here.
    pub fn derive(
        date: NaiveDate,
        baseline: &[DaySignals],
        today: Option<&DaySignals>,
        config: &FeatureConfig,
    ) -> DerivedFeatureRow {
        let mut row = DerivedFeatureRow::empty(date, config.baseline_window_days);
        let Some(today) = today else {
            return row;
        };

        let sleep = present(baseline.iter().map(|d| d.total_sleep_minutes));
        let hrv = present(baseline.iter().map(|d| d.hrv_rmssd));
        let rhr = present(baseline.iter().map(|d| d.resting_hr));
        let stress = present(baseline.iter().map(|d| d.avg_stress));
        let steps = present(baseline.iter().map(|d| d.steps));
        let active = present(baseline.iter().map(|d| d.active_minutes));

        if sleep.len() >= config.min_sleep_baseline_days {
            if let (Some(avg), Some(value)) = (nonzero(mean(&sleep)), today.total_sleep_minutes) {
                row.sleep_debt_minutes = Some((avg - value).round_ties_even() as i64);
                row.sleep_vs_baseline_pct = Some(value / avg - 1.0);
            }
        }

        if hrv.len() >= config.min_hrv_baseline_days {
            if let (Some(avg), Some(sd), Some(value)) =
                (mean(&hrv), nonzero(population_std(&hrv)), today.hrv_rmssd)
            {
                row.hrv_rmssd_zscore = Some((value - avg) / sd);
            }
        }

        if let (Some(avg), Some(value)) = (mean(&rhr), today.resting_hr) {
            row.resting_hr_delta = Some(value - avg);
        }

        if stress.len() >= config.min_stress_baseline_days {
            if let Some(value) = today.avg_stress {
                row.stress_percentile = percentile_rank(&stress, value);
            }
        }

        if steps.len() >= config.min_activity_baseline_days {
            if let (Some(avg), Some(value)) = (nonzero(mean(&steps)), today.steps) {
                row.steps_vs_baseline_pct = Some(value / avg - 1.0);
            }
        }

        if let (Some(avg), Some(value)) = (mean(&active), today.active_minutes) {
            row.active_minutes_delta = Some(value - avg);
        }

        row
    }
}

/// Recompute and store the feature row for (user, date) from canonical signals.
///
/// Re-running with unchanged canonical data writes an identical row.
pub fn compute_features<S: SignalStore + ?Sized>(
    store: &S,
    user: &UserId,
    date: NaiveDate,
    config: &FeatureConfig,
) -> Result<DerivedFeatureRow, MoodError> {
    let end = date.succ_opt().unwrap_or(NaiveDate::MAX);
    let mut days = store.day_signals(user, config.window_start(date), end)?;
    let today = match days.last() {
        Some(last) if last.date == date => days.pop(),
        _ => None,
    };

    let row = FeatureDeriver::derive(date, &days, today.as_ref(), config);
    debug!(
        user = %user,
        date = %date,
        baseline_days = days.len(),
        features = row.present_count(),
        "features computed"
    );
    store.upsert_features(user, &row)?;
    Ok(row)
}

fn present(values: impl Iterator<Item = Option<f64>>) -> Vec<f64> {
    values.flatten().collect()
}

fn nonzero(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0)
}

/// Arithmetic mean, `None` when empty
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation, `None` with fewer than two values
pub fn population_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let avg = mean(values)?;
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Fraction of `values` less than or equal to `value`
pub fn percentile_rank(values: &[f64], value: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let at_or_below = values.iter().filter(|v| **v <= value).count();
    Some(at_or_below as f64 / values.len() as f64)
}
