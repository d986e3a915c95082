//! Merge-by-coalesce for canonical rows
//!
//! A later ingestion of the same (user, date[, type]) only overwrites the fields
//! it actually carries. Storage backends apply [`Coalesce::merge`] to the stored
//! row and the incoming row before writing, so the rule does not depend on any
//! storage dialect.

use crate::types::{
    BodyBatteryStat, CanonicalRow, DailyActivity, DailyPhysiology, DailyStress, SleepSummary,
};

/// Field-wise merge where incoming values win unless they are null
pub trait Coalesce: Sized {
    fn merge(existing: Self, incoming: Self) -> Self;
}

impl Coalesce for SleepSummary {
    fn merge(existing: Self, incoming: Self) -> Self {
        Self {
            date: incoming.date,
            total_sleep_minutes: incoming.total_sleep_minutes.or(existing.total_sleep_minutes),
            deep_sleep_minutes: incoming.deep_sleep_minutes.or(existing.deep_sleep_minutes),
            light_sleep_minutes: incoming.light_sleep_minutes.or(existing.light_sleep_minutes),
            rem_sleep_minutes: incoming.rem_sleep_minutes.or(existing.rem_sleep_minutes),
            awake_minutes: incoming.awake_minutes.or(existing.awake_minutes),
            sleep_score: incoming.sleep_score.or(existing.sleep_score),
            bedtime: incoming.bedtime.or(existing.bedtime),
            wake_time: incoming.wake_time.or(existing.wake_time),
        }
    }
}

impl Coalesce for DailyPhysiology {
    fn merge(existing: Self, incoming: Self) -> Self {
        Self {
            date: incoming.date,
            resting_hr: incoming.resting_hr.or(existing.resting_hr),
            respiration_rate: incoming.respiration_rate.or(existing.respiration_rate),
            hrv_rmssd: incoming.hrv_rmssd.or(existing.hrv_rmssd),
        }
    }
}

impl Coalesce for DailyActivity {
    fn merge(existing: Self, incoming: Self) -> Self {
        Self {
            date: incoming.date,
            steps: incoming.steps.or(existing.steps),
            active_minutes: incoming.active_minutes.or(existing.active_minutes),
            calories: incoming.calories.or(existing.calories),
            distance_meters: incoming.distance_meters.or(existing.distance_meters),
        }
    }
}

impl Coalesce for DailyStress {
    fn merge(existing: Self, incoming: Self) -> Self {
        Self {
            date: incoming.date,
            stress_type: incoming.stress_type,
            avg_stress: incoming.avg_stress.or(existing.avg_stress),
            max_stress: incoming.max_stress.or(existing.max_stress),
            stress_duration_secs: incoming.stress_duration_secs.or(existing.stress_duration_secs),
            rest_duration_secs: incoming.rest_duration_secs.or(existing.rest_duration_secs),
        }
    }
}

impl Coalesce for BodyBatteryStat {
    fn merge(existing: Self, incoming: Self) -> Self {
        Self {
            date: incoming.date,
            stat_type: incoming.stat_type,
            value: incoming.value.or(existing.value),
        }
    }
}

/// Merge a stored row with an incoming row of the same family and key.
///
/// Rows of different families are never merged; the incoming row is returned.
pub fn merge_rows(existing: Option<CanonicalRow>, incoming: CanonicalRow) -> CanonicalRow {
    match (existing, incoming) {
        (Some(CanonicalRow::Sleep(old)), CanonicalRow::Sleep(new)) => {
            CanonicalRow::Sleep(SleepSummary::merge(old, new))
        }
        (Some(CanonicalRow::Physiology(old)), CanonicalRow::Physiology(new)) => {
            CanonicalRow::Physiology(DailyPhysiology::merge(old, new))
        }
        (Some(CanonicalRow::Activity(old)), CanonicalRow::Activity(new)) => {
            CanonicalRow::Activity(DailyActivity::merge(old, new))
        }
        (Some(CanonicalRow::Stress(old)), CanonicalRow::Stress(new)) => {
            CanonicalRow::Stress(DailyStress::merge(old, new))
        }
        (Some(CanonicalRow::BodyBattery(old)), CanonicalRow::BodyBattery(new)) => {
            CanonicalRow::BodyBattery(BodyBatteryStat::merge(old, new))
        }
        (_, incoming) => incoming,
    }
}
