//! In-memory store
//!
//! Mutex-guarded ordered maps. Every trait call takes the lock once, so ledger
//! admission is a single atomic check-and-insert.

use super::{require_terminal, SignalStore};
use crate::error::MoodError;
use crate::merge::Coalesce;
use crate::types::{
    BodyBatteryStat, CanonicalRow, DailyActivity, DailyPhysiology, DailyStress, DaySignals,
    DerivedFeatureRow, MoodLabel, Prediction, SleepSummary, UploadRecord, UploadStatus, UserId,
    TOTAL_STRESS_TYPE,
};
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

type DayKey = (UserId, NaiveDate);
type TypedDayKey = (UserId, NaiveDate, String);

#[derive(Debug, Default)]
struct Tables {
    sleep: BTreeMap<DayKey, SleepSummary>,
    physiology: BTreeMap<DayKey, DailyPhysiology>,
    activity: BTreeMap<DayKey, DailyActivity>,
    stress: BTreeMap<TypedDayKey, DailyStress>,
    body_battery: BTreeMap<TypedDayKey, BodyBatteryStat>,
    features: BTreeMap<DayKey, DerivedFeatureRow>,
    predictions: BTreeMap<DayKey, Prediction>,
    uploads: HashMap<(UserId, String), UploadRecord>,
    labels: BTreeMap<DayKey, MoodLabel>,
}

impl Tables {
    fn signal_dates(&self, user: &UserId) -> BTreeSet<NaiveDate> {
        let mut dates = BTreeSet::new();
        dates.extend(self.sleep.keys().filter(|(u, _)| u == user).map(|(_, d)| *d));
        dates.extend(self.physiology.keys().filter(|(u, _)| u == user).map(|(_, d)| *d));
        dates.extend(self.activity.keys().filter(|(u, _)| u == user).map(|(_, d)| *d));
        dates.extend(self.stress.keys().filter(|(u, _, _)| u == user).map(|(_, d, _)| *d));
        dates
    }

    fn day_signals(&self, user: &UserId, date: NaiveDate) -> DaySignals {
        let key = (user.clone(), date);
        let sleep = self.sleep.get(&key);
        let physiology = self.physiology.get(&key);
        let activity = self.activity.get(&key);
        let stress = self
            .stress
            .get(&(user.clone(), date, TOTAL_STRESS_TYPE.to_string()));

        DaySignals {
            date,
            total_sleep_minutes: sleep.and_then(|s| s.total_sleep_minutes).map(|v| v as f64),
            hrv_rmssd: physiology.and_then(|p| p.hrv_rmssd),
            resting_hr: physiology.and_then(|p| p.resting_hr).map(|v| v as f64),
            steps: activity.and_then(|a| a.steps).map(|v| v as f64),
            active_minutes: activity.and_then(|a| a.active_minutes).map(|v| v as f64),
            avg_stress: stress.and_then(|s| s.avg_stress),
        }
    }
}

fn upsert<K: Ord, V: Coalesce>(table: &mut BTreeMap<K, V>, key: K, incoming: V) {
    let merged = match table.remove(&key) {
        Some(existing) => V::merge(existing, incoming),
        None => incoming,
    };
    table.insert(key, merged);
}

/// In-memory [`SignalStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, MoodError> {
        self.tables
            .lock()
            .map_err(|_| MoodError::Storage("memory store lock poisoned".to_string()))
    }
}

impl SignalStore for MemoryStore {
    fn upsert_signal(&self, user: &UserId, row: CanonicalRow) -> Result<(), MoodError> {
        let mut t = self.tables()?;
        match row {
            CanonicalRow::Sleep(r) => upsert(&mut t.sleep, (user.clone(), r.date), r),
            CanonicalRow::Physiology(r) => upsert(&mut t.physiology, (user.clone(), r.date), r),
            CanonicalRow::Activity(r) => upsert(&mut t.activity, (user.clone(), r.date), r),
            CanonicalRow::Stress(r) => {
                let key = (user.clone(), r.date, r.stress_type.clone());
                upsert(&mut t.stress, key, r)
            }
            CanonicalRow::BodyBattery(r) => {
                let key = (user.clone(), r.date, r.stat_type.clone());
                upsert(&mut t.body_battery, key, r)
            }
        }
        Ok(())
    }

    fn signal_dates(&self, user: &UserId) -> Result<Vec<NaiveDate>, MoodError> {
        Ok(self.tables()?.signal_dates(user).into_iter().collect())
    }

    fn day_signals(
        &self,
        user: &UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DaySignals>, MoodError> {
        let t = self.tables()?;
        Ok(t.signal_dates(user)
            .range(start..end)
            .map(|date| t.day_signals(user, *date))
            .collect())
    }

    fn upsert_features(&self, user: &UserId, row: &DerivedFeatureRow) -> Result<(), MoodError> {
        self.tables()?
            .features
            .insert((user.clone(), row.date), row.clone());
        Ok(())
    }

    fn features(
        &self,
        user: &UserId,
        date: NaiveDate,
    ) -> Result<Option<DerivedFeatureRow>, MoodError> {
        Ok(self.tables()?.features.get(&(user.clone(), date)).cloned())
    }

    fn upsert_prediction(&self, user: &UserId, prediction: &Prediction) -> Result<(), MoodError> {
        self.tables()?
            .predictions
            .insert((user.clone(), prediction.date), prediction.clone());
        Ok(())
    }

    fn prediction(&self, user: &UserId, date: NaiveDate) -> Result<Option<Prediction>, MoodError> {
        Ok(self.tables()?.predictions.get(&(user.clone(), date)).cloned())
    }

    fn predictions(
        &self,
        user: &UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Prediction>, MoodError> {
        if start > end {
            return Ok(Vec::new());
        }
        let t = self.tables()?;
        Ok(t.predictions
            .range((user.clone(), start)..=(user.clone(), end))
            .map(|(_, p)| p.clone())
            .collect())
    }

    fn admit_upload(
        &self,
        user: &UserId,
        filename: &str,
        content_hash: &str,
    ) -> Result<bool, MoodError> {
        let mut t = self.tables()?;
        let key = (user.clone(), content_hash.to_string());
        if t.uploads.contains_key(&key) {
            return Ok(false);
        }

        let now = Utc::now();
        t.uploads.insert(
            key,
            UploadRecord {
                id: Uuid::new_v4(),
                user_id: user.clone(),
                filename: filename.to_string(),
                content_hash: content_hash.to_string(),
                status: UploadStatus::Processing,
                error: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(true)
    }

    fn reopen_failed_upload(
        &self,
        user: &UserId,
        filename: &str,
        content_hash: &str,
    ) -> Result<bool, MoodError> {
        let mut t = self.tables()?;
        match t.uploads.get_mut(&(user.clone(), content_hash.to_string())) {
            Some(record) if record.status == UploadStatus::Failed => {
                record.status = UploadStatus::Processing;
                record.error = None;
                record.filename = filename.to_string();
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn complete_upload(
        &self,
        user: &UserId,
        content_hash: &str,
        status: UploadStatus,
        error: Option<&str>,
    ) -> Result<(), MoodError> {
        require_terminal(status)?;
        let mut t = self.tables()?;
        match t.uploads.get_mut(&(user.clone(), content_hash.to_string())) {
            Some(record) if record.status == UploadStatus::Processing => {
                record.status = status;
                record.error = error.map(str::to_string);
                record.updated_at = Utc::now();
                Ok(())
            }
            Some(record) => Err(MoodError::Ledger(format!(
                "upload {content_hash} is already {}",
                record.status.as_str()
            ))),
            None => Err(MoodError::Ledger(format!(
                "no upload {content_hash} for user {user}"
            ))),
        }
    }

    fn upload(
        &self,
        user: &UserId,
        content_hash: &str,
    ) -> Result<Option<UploadRecord>, MoodError> {
        Ok(self
            .tables()?
            .uploads
            .get(&(user.clone(), content_hash.to_string()))
            .cloned())
    }

    fn upsert_mood_label(&self, user: &UserId, label: &MoodLabel) -> Result<(), MoodError> {
        self.tables()?
            .labels
            .insert((user.clone(), label.date), label.clone());
        Ok(())
    }

    fn mood_labels(
        &self,
        user: &UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MoodLabel>, MoodError> {
        if start > end {
            return Ok(Vec::new());
        }
        let t = self.tables()?;
        Ok(t.labels
            .range((user.clone(), start)..=(user.clone(), end))
            .map(|(_, l)| l.clone())
            .collect())
    }
}
