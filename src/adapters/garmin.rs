//! Garmin export adapters
//!
//! Parses the per-record JSON shapes of a Garmin Connect data export
//! (`*sleepData.json`, `*healthStatusData.json`, `UDSFile_*.json`) and maps
//! them to canonical per-day rows.

use crate::types::{
    BodyBatteryStat, CanonicalRow, DailyActivity, DailyPhysiology, DailyStress, ExportKind,
    SleepSummary,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::ExportAdapter;

/// Sleep export adapter (`*sleepData.json`)
pub struct GarminSleepAdapter;

/// Health status adapter (`*healthStatusData.json`)
pub struct GarminHealthStatusAdapter;

/// Daily aggregate adapter (`UDSFile_*.json`)
pub struct GarminDailyAggregateAdapter;

impl ExportAdapter for GarminSleepAdapter {
    fn kind(&self) -> ExportKind {
        ExportKind::Sleep
    }

    fn normalize_record(&self, raw: &Value) -> Option<Vec<CanonicalRow>> {
        let record: GarminSleep = serde_json::from_value(raw.clone()).ok()?;
        let date = record.calendar_date.as_ref()?.to_naive_date()?;

        // Entries without a start timestamp are placeholders for unmeasured nights
        let bedtime = record.sleep_start_timestamp_gmt.as_ref()?.to_naive();

        let deep = record.deep_sleep_seconds.map(seconds_to_minutes);
        let light = record.light_sleep_seconds.map(seconds_to_minutes);
        let rem = record.rem_sleep_seconds.map(seconds_to_minutes);
        let awake = record.awake_sleep_seconds.map(seconds_to_minutes);

        let total = deep.unwrap_or(0) + light.unwrap_or(0) + rem.unwrap_or(0);
        if total == 0 {
            return None;
        }

        Some(vec![CanonicalRow::Sleep(SleepSummary {
            date,
            total_sleep_minutes: Some(total),
            deep_sleep_minutes: deep,
            light_sleep_minutes: light,
            rem_sleep_minutes: rem,
            awake_minutes: awake,
            sleep_score: record.sleep_scores.and_then(|s| s.overall_score),
            bedtime,
            wake_time: record
                .sleep_end_timestamp_gmt
                .as_ref()
                .and_then(GarminTimestamp::to_naive),
        })])
    }
}

impl ExportAdapter for GarminHealthStatusAdapter {
    fn kind(&self) -> ExportKind {
        ExportKind::HealthStatus
    }

    fn normalize_record(&self, raw: &Value) -> Option<Vec<CanonicalRow>> {
        let record: GarminHealthStatus = serde_json::from_value(raw.clone()).ok()?;
        let date = record.calendar_date.as_ref()?.to_naive_date()?;

        let mut physiology = DailyPhysiology::empty(date);
        for metric in record.metrics.unwrap_or_default() {
            let Some(value) = metric.value else {
                continue;
            };
            match metric.metric_type.as_deref() {
                Some("HR") => physiology.resting_hr = Some(value as i64),
                Some("RESPIRATION") => physiology.respiration_rate = Some(value),
                // Nightly RMSSD-style HRV
                Some("HRV") => physiology.hrv_rmssd = Some(value),
                _ => {}
            }
        }

        if physiology == DailyPhysiology::empty(date) {
            return None;
        }

        Some(vec![CanonicalRow::Physiology(physiology)])
    }
}

impl ExportAdapter for GarminDailyAggregateAdapter {
    fn kind(&self) -> ExportKind {
        ExportKind::DailyAggregate
    }

    fn normalize_record(&self, raw: &Value) -> Option<Vec<CanonicalRow>> {
        let record: GarminDailyAggregate = serde_json::from_value(raw.clone()).ok()?;
        let date = record.calendar_date.as_ref()?.to_naive_date()?;

        let mut rows = Vec::new();

        let activity = DailyActivity {
            date,
            steps: record.total_steps.map(|s| s as i64),
            active_minutes: active_minutes(
                record.moderate_intensity_minutes,
                record.vigorous_intensity_minutes,
            ),
            calories: record.total_kilocalories,
            distance_meters: record.total_distance_meters,
        };
        if activity.steps.is_some()
            || activity.active_minutes.is_some()
            || activity.calories.is_some()
            || activity.distance_meters.is_some()
        {
            rows.push(CanonicalRow::Activity(activity));
        }

        let aggregators = record
            .all_day_stress
            .and_then(|s| s.aggregator_list)
            .unwrap_or_default();
        for aggregator in aggregators {
            let Some(stress_type) = aggregator.aggregator_type else {
                continue;
            };
            rows.push(CanonicalRow::Stress(DailyStress {
                date,
                stress_type,
                avg_stress: non_negative(aggregator.average_stress_level),
                max_stress: non_negative(aggregator.max_stress_level),
                stress_duration_secs: aggregator.stress_duration.map(|d| d as i64),
                rest_duration_secs: aggregator.rest_duration.map(|d| d as i64),
            }));
        }

        let stats = record
            .body_battery
            .and_then(|b| b.body_battery_stat_list)
            .unwrap_or_default();
        for stat in stats {
            let Some(stat_type) = stat.body_battery_stat_type else {
                continue;
            };
            rows.push(CanonicalRow::BodyBattery(BodyBatteryStat {
                date,
                stat_type,
                value: stat.stats_value,
            }));
        }

        Some(rows)
    }
}

/// Whole minutes from a seconds duration
fn seconds_to_minutes(seconds: f64) -> i64 {
    (seconds / 60.0).floor() as i64
}

/// Moderate + vigorous minutes; a missing term counts as zero only when the other is present
fn active_minutes(moderate: Option<f64>, vigorous: Option<f64>) -> Option<i64> {
    match (moderate, vigorous) {
        (None, None) => None,
        (m, v) => Some((m.unwrap_or(0.0) + v.unwrap_or(0.0)) as i64),
    }
}

/// Garmin encodes "not enough data" stress levels as negative sentinels
fn non_negative(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v >= 0.0)
}

// Garmin export record structures

/// `calendarDate` is a plain string in most files and `{"date": ...}` in older UDS files
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CalendarDate {
    Plain(String),
    Wrapped { date: String },
}

impl CalendarDate {
    fn to_naive_date(&self) -> Option<NaiveDate> {
        let raw = match self {
            CalendarDate::Plain(s) => s,
            CalendarDate::Wrapped { date } => date,
        };
        // Some exports append a time component
        let day = raw.get(..10).unwrap_or(raw);
        NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GarminTimestamp {
    Millis(i64),
    Text(String),
}

impl GarminTimestamp {
    fn to_naive(&self) -> Option<NaiveDateTime> {
        match self {
            GarminTimestamp::Millis(ms) => {
                DateTime::<Utc>::from_timestamp_millis(*ms).map(|dt| dt.naive_utc())
            }
            GarminTimestamp::Text(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                .ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminSleep {
    calendar_date: Option<CalendarDate>,
    #[serde(rename = "sleepStartTimestampGMT")]
    sleep_start_timestamp_gmt: Option<GarminTimestamp>,
    #[serde(rename = "sleepEndTimestampGMT")]
    sleep_end_timestamp_gmt: Option<GarminTimestamp>,
    deep_sleep_seconds: Option<f64>,
    light_sleep_seconds: Option<f64>,
    rem_sleep_seconds: Option<f64>,
    awake_sleep_seconds: Option<f64>,
    sleep_scores: Option<GarminSleepScores>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminSleepScores {
    overall_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminHealthStatus {
    calendar_date: Option<CalendarDate>,
    metrics: Option<Vec<GarminMetric>>,
}

#[derive(Debug, Deserialize)]
struct GarminMetric {
    #[serde(rename = "type")]
    metric_type: Option<String>,
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminDailyAggregate {
    calendar_date: Option<CalendarDate>,
    total_steps: Option<f64>,
    total_kilocalories: Option<f64>,
    total_distance_meters: Option<f64>,
    moderate_intensity_minutes: Option<f64>,
    vigorous_intensity_minutes: Option<f64>,
    all_day_stress: Option<GarminAllDayStress>,
    body_battery: Option<GarminBodyBattery>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminAllDayStress {
    aggregator_list: Option<Vec<GarminStressAggregator>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminStressAggregator {
    #[serde(rename = "type")]
    aggregator_type: Option<String>,
    average_stress_level: Option<f64>,
    max_stress_level: Option<f64>,
    stress_duration: Option<f64>,
    rest_duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminBodyBattery {
    body_battery_stat_list: Option<Vec<GarminBodyBatteryStat>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminBodyBatteryStat {
    body_battery_stat_type: Option<String>,
    stats_value: Option<f64>,
}
