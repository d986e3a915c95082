//! Read-side responses
//!
//! Response shapes for prediction history, the single-day lookup and
//! self-reported mood labels. Every calendar day of a requested range gets an
//! entry, marked `missing` when nothing is stored for it.

use crate::error::MoodError;
use crate::store::SignalStore;
use crate::types::{Confidence, MoodLabel, Prediction, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reason reported when a day has no prediction
pub const NOT_COMPUTED_REASON: &str = "No prediction exists for this date";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Available,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodayStatus {
    Available,
    NotComputed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryDay {
    pub date: NaiveDate,
    pub predicted_mood: Option<f64>,
    pub confidence: Option<Confidence>,
    pub explanation: Vec<String>,
    pub status: DayStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: Vec<HistoryDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodayResponse {
    pub date: NaiveDate,
    pub predicted_mood: Option<f64>,
    pub confidence: Option<Confidence>,
    pub explanation: Vec<String>,
    pub model_version: Option<String>,
    pub status: TodayStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodDay {
    pub date: NaiveDate,
    pub mood: Option<u8>,
    pub note: Option<String>,
    pub status: DayStatus,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodHistoryResponse {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: Vec<MoodDay>,
}

fn check_range(start: NaiveDate, end: NaiveDate) -> Result<(), MoodError> {
    if start > end {
        return Err(MoodError::InvalidRange(format!(
            "start date {start} must not be after end date {end}"
        )));
    }
    Ok(())
}

/// One entry per calendar day in `[start, end]`
pub fn history<S: SignalStore + ?Sized>(
    store: &S,
    user: &UserId,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<HistoryResponse, MoodError> {
    check_range(start, end)?;
    let mut by_date: HashMap<NaiveDate, Prediction> = store
        .predictions(user, start, end)?
        .into_iter()
        .map(|p| (p.date, p))
        .collect();

    let days = start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(|date| match by_date.remove(&date) {
            Some(p) => HistoryDay {
                date,
                predicted_mood: Some(p.predicted_mood),
                confidence: Some(p.confidence),
                explanation: p.explanation,
                status: DayStatus::Available,
            },
            None => HistoryDay {
                date,
                predicted_mood: None,
                confidence: None,
                explanation: Vec::new(),
                status: DayStatus::Missing,
            },
        })
        .collect();

    Ok(HistoryResponse { start, end, days })
}

/// Prediction lookup for a single day
pub fn today<S: SignalStore + ?Sized>(
    store: &S,
    user: &UserId,
    date: NaiveDate,
) -> Result<TodayResponse, MoodError> {
    Ok(match store.prediction(user, date)? {
        Some(p) => TodayResponse {
            date,
            predicted_mood: Some(p.predicted_mood),
            confidence: Some(p.confidence),
            explanation: p.explanation,
            model_version: Some(p.model_version),
            status: TodayStatus::Available,
            reason: None,
        },
        None => TodayResponse {
            date,
            predicted_mood: None,
            confidence: None,
            explanation: Vec::new(),
            model_version: None,
            status: TodayStatus::NotComputed,
            reason: Some(NOT_COMPUTED_REASON.to_string()),
        },
    })
}

/// Self-reported moods, one entry per calendar day in `[start, end]`
pub fn mood_history<S: SignalStore + ?Sized>(
    store: &S,
    user: &UserId,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<MoodHistoryResponse, MoodError> {
    check_range(start, end)?;
    let mut by_date: HashMap<NaiveDate, MoodLabel> = store
        .mood_labels(user, start, end)?
        .into_iter()
        .map(|l| (l.date, l))
        .collect();

    let days = start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(|date| match by_date.remove(&date) {
            Some(l) => MoodDay {
                date,
                mood: Some(l.mood),
                note: l.note,
                status: DayStatus::Available,
                created_at: Some(l.created_at),
            },
            None => MoodDay {
                date,
                mood: None,
                note: None,
                status: DayStatus::Missing,
                created_at: None,
            },
        })
        .collect();

    Ok(MoodHistoryResponse { start, end, days })
}

/// Record (or replace) the self-reported mood for a day.
///
/// Replacing a label keeps its original `created_at`.
pub fn record_mood<S: SignalStore + ?Sized>(
    store: &S,
    user: &UserId,
    date: NaiveDate,
    mood: u8,
    note: Option<String>,
) -> Result<MoodLabel, MoodError> {
    if !(1..=5).contains(&mood) {
        return Err(MoodError::InvalidLabel(format!(
            "mood must be between 1 and 5, got {mood}"
        )));
    }

    let created_at = store
        .mood_labels(user, date, date)?
        .into_iter()
        .next()
        .map(|existing| existing.created_at)
        .unwrap_or_else(Utc::now);

    let label = MoodLabel {
        date,
        mood,
        note,
        created_at,
    };
    store.upsert_mood_label(user, &label)?;
    Ok(label)
}
