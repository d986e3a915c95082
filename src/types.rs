//! Core types for the Synheart Mood pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: canonical per-day signal rows, joined baseline inputs, derived
//! feature rows, predictions, and upload ledger records.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::MoodError;

/// Opaque user identifier. Every stored row is keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of a raw export file, detected from its file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    Sleep,
    HealthStatus,
    DailyAggregate,
    Unknown,
}

impl ExportKind {
    /// Detect the export kind from a file name (directories are ignored)
    pub fn from_file_name(name: &str) -> Self {
        let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name);
        if base.ends_with("sleepData.json") {
            ExportKind::Sleep
        } else if base.ends_with("healthStatusData.json") {
            ExportKind::HealthStatus
        } else if base.starts_with("UDSFile_") {
            ExportKind::DailyAggregate
        } else {
            ExportKind::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Sleep => "sleep",
            ExportKind::HealthStatus => "health_status",
            ExportKind::DailyAggregate => "daily_aggregate",
            ExportKind::Unknown => "unknown",
        }
    }
}

/// Signal family a canonical row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalFamily {
    Sleep,
    Physiology,
    Activity,
    Stress,
    BodyBattery,
}

impl SignalFamily {
    /// Whether a row of this family makes its date a signal date.
    ///
    /// Body battery is stored but never anchors a day on its own.
    pub fn anchors_day(&self) -> bool {
        !matches!(self, SignalFamily::BodyBattery)
    }
}

/// Nightly sleep summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepSummary {
    pub date: NaiveDate,
    /// Deep + light + REM (awake time excluded)
    pub total_sleep_minutes: Option<i64>,
    pub deep_sleep_minutes: Option<i64>,
    pub light_sleep_minutes: Option<i64>,
    pub rem_sleep_minutes: Option<i64>,
    pub awake_minutes: Option<i64>,
    /// Vendor sleep score (0-100)
    pub sleep_score: Option<f64>,
    pub bedtime: Option<NaiveDateTime>,
    pub wake_time: Option<NaiveDateTime>,
}

/// Daily physiology: resting heart rate, respiration and nightly HRV
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPhysiology {
    pub date: NaiveDate,
    pub resting_hr: Option<i64>,
    pub respiration_rate: Option<f64>,
    pub hrv_rmssd: Option<f64>,
}

impl DailyPhysiology {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            resting_hr: None,
            respiration_rate: None,
            hrv_rmssd: None,
        }
    }
}

/// Daily activity totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub steps: Option<i64>,
    /// Moderate + vigorous intensity minutes
    pub active_minutes: Option<i64>,
    pub calories: Option<f64>,
    pub distance_meters: Option<f64>,
}

/// Daily stress aggregate for one aggregator type (TOTAL, AWAKE, ASLEEP)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStress {
    pub date: NaiveDate,
    pub stress_type: String,
    pub avg_stress: Option<f64>,
    pub max_stress: Option<f64>,
    pub stress_duration_secs: Option<i64>,
    pub rest_duration_secs: Option<i64>,
}

/// Stress aggregator type used for baseline features
pub const TOTAL_STRESS_TYPE: &str = "TOTAL";

/// One body-battery statistic for a day (HIGHEST, LOWEST, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyBatteryStat {
    pub date: NaiveDate,
    pub stat_type: String,
    pub value: Option<f64>,
}

/// A normalized, storage-ready row for one signal family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum CanonicalRow {
    Sleep(SleepSummary),
    Physiology(DailyPhysiology),
    Activity(DailyActivity),
    Stress(DailyStress),
    BodyBattery(BodyBatteryStat),
}

impl CanonicalRow {
    pub fn date(&self) -> NaiveDate {
        match self {
            CanonicalRow::Sleep(r) => r.date,
            CanonicalRow::Physiology(r) => r.date,
            CanonicalRow::Activity(r) => r.date,
            CanonicalRow::Stress(r) => r.date,
            CanonicalRow::BodyBattery(r) => r.date,
        }
    }

    pub fn family(&self) -> SignalFamily {
        match self {
            CanonicalRow::Sleep(_) => SignalFamily::Sleep,
            CanonicalRow::Physiology(_) => SignalFamily::Physiology,
            CanonicalRow::Activity(_) => SignalFamily::Activity,
            CanonicalRow::Stress(_) => SignalFamily::Stress,
            CanonicalRow::BodyBattery(_) => SignalFamily::BodyBattery,
        }
    }
}

/// The six source series for one calendar day, joined across signal families
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySignals {
    pub date: NaiveDate,
    pub total_sleep_minutes: Option<f64>,
    pub hrv_rmssd: Option<f64>,
    pub resting_hr: Option<f64>,
    pub steps: Option<f64>,
    pub active_minutes: Option<f64>,
    /// Average stress of the TOTAL aggregator
    pub avg_stress: Option<f64>,
}

impl DaySignals {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_sleep_minutes: None,
            hrv_rmssd: None,
            resting_hr: None,
            steps: None,
            active_minutes: None,
            avg_stress: None,
        }
    }
}

/// Baseline-relative features for one (user, date)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedFeatureRow {
    pub date: NaiveDate,
    pub sleep_debt_minutes: Option<i64>,
    pub sleep_vs_baseline_pct: Option<f64>,
    pub hrv_rmssd_zscore: Option<f64>,
    pub resting_hr_delta: Option<f64>,
    pub stress_percentile: Option<f64>,
    pub steps_vs_baseline_pct: Option<f64>,
    pub active_minutes_delta: Option<f64>,
    /// Size of the calendar window the baseline was drawn from
    pub baseline_window_days: u32,
}

impl DerivedFeatureRow {
    /// A row with every feature unknown
    pub fn empty(date: NaiveDate, baseline_window_days: u32) -> Self {
        Self {
            date,
            sleep_debt_minutes: None,
            sleep_vs_baseline_pct: None,
            hrv_rmssd_zscore: None,
            resting_hr_delta: None,
            stress_percentile: None,
            steps_vs_baseline_pct: None,
            active_minutes_delta: None,
            baseline_window_days,
        }
    }

    /// Number of the seven features that are known
    pub fn present_count(&self) -> usize {
        [
            self.sleep_debt_minutes.is_some(),
            self.sleep_vs_baseline_pct.is_some(),
            self.hrv_rmssd_zscore.is_some(),
            self.resting_hr_delta.is_some(),
            self.stress_percentile.is_some(),
            self.steps_vs_baseline_pct.is_some(),
            self.active_minutes_delta.is_some(),
        ]
        .into_iter()
        .filter(|known| *known)
        .count()
    }
}

/// Coarse reliability grade of a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl FromStr for Confidence {
    type Err = MoodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Confidence::Low),
            "medium" => Ok(Confidence::Medium),
            "high" => Ok(Confidence::High),
            other => Err(MoodError::Storage(format!("unknown confidence '{other}'"))),
        }
    }
}

/// Output of the rule-based inference engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodEstimate {
    /// Continuous mood on [1.0, 5.0], rounded to 2 decimals
    pub mood: f64,
    /// Unrounded clamped score rounded to the nearest integer
    pub mood_discrete: u8,
    pub confidence: Confidence,
    pub explanation: Vec<String>,
    pub model_version: String,
}

/// Stored prediction for one (user, date)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub date: NaiveDate,
    pub predicted_mood: f64,
    pub predicted_mood_discrete: Option<u8>,
    pub confidence: Confidence,
    pub explanation: Vec<String>,
    pub model_version: String,
}

impl Prediction {
    pub fn from_estimate(date: NaiveDate, estimate: MoodEstimate) -> Self {
        Self {
            date,
            predicted_mood: estimate.mood,
            predicted_mood_discrete: Some(estimate.mood_discrete),
            confidence: estimate.confidence,
            explanation: estimate.explanation,
            model_version: estimate.model_version,
        }
    }
}

/// Upload ledger status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Processing,
    Success,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Processing => "processing",
            UploadStatus::Success => "success",
            UploadStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, UploadStatus::Processing)
    }
}

impl FromStr for UploadStatus {
    type Err = MoodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(UploadStatus::Processing),
            "success" => Ok(UploadStatus::Success),
            "failed" => Ok(UploadStatus::Failed),
            other => Err(MoodError::Storage(format!("unknown upload status '{other}'"))),
        }
    }
}

/// One ledger row per (user, content hash)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub filename: String,
    pub content_hash: String,
    pub status: UploadStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Self-reported mood for one (user, date)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodLabel {
    pub date: NaiveDate,
    pub mood: u8,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_kind_detection() {
        assert_eq!(
            ExportKind::from_file_name("DI_CONNECT/DI-Connect-Wellness/2025-01-01_2025-04-11_123_sleepData.json"),
            ExportKind::Sleep
        );
        assert_eq!(
            ExportKind::from_file_name("123_healthStatusData.json"),
            ExportKind::HealthStatus
        );
        assert_eq!(
            ExportKind::from_file_name("DI-Connect-Aggregator/UDSFile_2025-09-01_2025-12-10.json"),
            ExportKind::DailyAggregate
        );
        assert_eq!(ExportKind::from_file_name("summary.json"), ExportKind::Unknown);
    }

    #[test]
    fn test_present_count() {
        let date = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        let mut row = DerivedFeatureRow::empty(date, 28);
        assert_eq!(row.present_count(), 0);

        row.sleep_debt_minutes = Some(-10);
        row.stress_percentile = Some(0.4);
        assert_eq!(row.present_count(), 2);
    }

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::Low < Confidence::Medium);
        assert!(Confidence::Medium < Confidence::High);
        assert_eq!("medium".parse::<Confidence>().unwrap(), Confidence::Medium);
    }
}
