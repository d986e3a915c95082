//! SQLite store
//!
//! One connection behind a mutex. Signal upserts read the stored row, merge it
//! in Rust and write the merged row inside one transaction; ledger admission is
//! a single `INSERT .. ON CONFLICT DO NOTHING`.

use super::{require_terminal, SignalStore};
use crate::error::MoodError;
use crate::merge::Coalesce;
use crate::types::{
    BodyBatteryStat, CanonicalRow, DailyActivity, DailyPhysiology, DailyStress, DaySignals,
    DerivedFeatureRow, MoodLabel, Prediction, SleepSummary, UploadRecord, UploadStatus, UserId,
    TOTAL_STRESS_TYPE,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, Params, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

const CURRENT_SCHEMA_VERSION: i32 = 1;
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// SQLite-backed [`SignalStore`]
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) a database file and run migrations
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MoodError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            warn!(path = %path.display(), "failed to enable WAL journal mode: {err}");
        }
        debug!(path = %path.display(), "opened sqlite store");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, MoodError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(mut conn: Connection) -> Result<Self, MoodError> {
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Schema version recorded in the database
    pub fn schema_version(&self) -> Result<i32, MoodError> {
        let conn = self.conn()?;
        Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, MoodError> {
        self.conn
            .lock()
            .map_err(|_| MoodError::Storage("sqlite connection lock poisoned".to_string()))
    }
}

fn run_migrations(conn: &mut Connection) -> Result<(), MoodError> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version > CURRENT_SCHEMA_VERSION {
        return Err(MoodError::Storage(format!(
            "database version ({version}) is newer than supported schema ({CURRENT_SCHEMA_VERSION})"
        )));
    }
    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    tx.execute_batch(include_str!("schema_v1.sql"))?;
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
    tx.commit()?;
    Ok(())
}

fn query_one<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: fn(&Row<'_>) -> Result<T, MoodError>,
) -> Result<Option<T>, MoodError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let value = match rows.next()? {
        Some(row) => Some(map(row)?),
        None => None,
    };
    Ok(value)
}

fn query_all<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: fn(&Row<'_>) -> Result<T, MoodError>,
) -> Result<Vec<T>, MoodError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(map(row)?);
    }
    Ok(out)
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(value: &str, field: &str) -> Result<NaiveDate, MoodError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|err| MoodError::InvalidDate(format!("invalid {field} '{value}': {err}")))
}

fn parse_optional_timestamp(
    value: Option<String>,
    field: &str,
) -> Result<Option<NaiveDateTime>, MoodError> {
    value
        .map(|v| {
            NaiveDateTime::parse_from_str(&v, TIMESTAMP_FORMAT).map_err(|err| {
                MoodError::Storage(format!("invalid {field} '{v}': {err}"))
            })
        })
        .transpose()
}

fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>, MoodError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| MoodError::Storage(format!("invalid {field} '{value}': {err}")))
}

fn row_date(row: &Row<'_>) -> Result<NaiveDate, MoodError> {
    let date: String = row.get("date")?;
    parse_date(&date, "date")
}

fn row_to_sleep(row: &Row<'_>) -> Result<SleepSummary, MoodError> {
    Ok(SleepSummary {
        date: row_date(row)?,
        total_sleep_minutes: row.get("total_sleep_minutes")?,
        deep_sleep_minutes: row.get("deep_sleep_minutes")?,
        light_sleep_minutes: row.get("light_sleep_minutes")?,
        rem_sleep_minutes: row.get("rem_sleep_minutes")?,
        awake_minutes: row.get("awake_minutes")?,
        sleep_score: row.get("sleep_score")?,
        bedtime: parse_optional_timestamp(row.get("bedtime")?, "bedtime")?,
        wake_time: parse_optional_timestamp(row.get("wake_time")?, "wake_time")?,
    })
}

fn row_to_physiology(row: &Row<'_>) -> Result<DailyPhysiology, MoodError> {
    Ok(DailyPhysiology {
        date: row_date(row)?,
        resting_hr: row.get("resting_hr")?,
        respiration_rate: row.get("respiration_rate")?,
        hrv_rmssd: row.get("hrv_rmssd")?,
    })
}

fn row_to_activity(row: &Row<'_>) -> Result<DailyActivity, MoodError> {
    Ok(DailyActivity {
        date: row_date(row)?,
        steps: row.get("steps")?,
        active_minutes: row.get("active_minutes")?,
        calories: row.get("calories")?,
        distance_meters: row.get("distance_meters")?,
    })
}

fn row_to_stress(row: &Row<'_>) -> Result<DailyStress, MoodError> {
    Ok(DailyStress {
        date: row_date(row)?,
        stress_type: row.get("stress_type")?,
        avg_stress: row.get("avg_stress")?,
        max_stress: row.get("max_stress")?,
        stress_duration_secs: row.get("stress_duration_secs")?,
        rest_duration_secs: row.get("rest_duration_secs")?,
    })
}

fn row_to_body_battery(row: &Row<'_>) -> Result<BodyBatteryStat, MoodError> {
    Ok(BodyBatteryStat {
        date: row_date(row)?,
        stat_type: row.get("stat_type")?,
        value: row.get("value")?,
    })
}

fn row_to_day_signals(row: &Row<'_>) -> Result<DaySignals, MoodError> {
    Ok(DaySignals {
        date: row_date(row)?,
        total_sleep_minutes: row.get("total_sleep_minutes")?,
        hrv_rmssd: row.get("hrv_rmssd")?,
        resting_hr: row.get("resting_hr")?,
        steps: row.get("steps")?,
        active_minutes: row.get("active_minutes")?,
        avg_stress: row.get("avg_stress")?,
    })
}

fn row_to_features(row: &Row<'_>) -> Result<DerivedFeatureRow, MoodError> {
    Ok(DerivedFeatureRow {
        date: row_date(row)?,
        sleep_debt_minutes: row.get("sleep_debt_minutes")?,
        sleep_vs_baseline_pct: row.get("sleep_vs_baseline_pct")?,
        hrv_rmssd_zscore: row.get("hrv_rmssd_zscore")?,
        resting_hr_delta: row.get("resting_hr_delta")?,
        stress_percentile: row.get("stress_percentile")?,
        steps_vs_baseline_pct: row.get("steps_vs_baseline_pct")?,
        active_minutes_delta: row.get("active_minutes_delta")?,
        baseline_window_days: row.get("baseline_window_days")?,
    })
}

fn row_to_prediction(row: &Row<'_>) -> Result<Prediction, MoodError> {
    let confidence: String = row.get("confidence")?;
    let explanation: String = row.get("explanation")?;
    Ok(Prediction {
        date: row_date(row)?,
        predicted_mood: row.get("predicted_mood")?,
        predicted_mood_discrete: row.get("predicted_mood_discrete")?,
        confidence: confidence.parse()?,
        explanation: serde_json::from_str(&explanation)?,
        model_version: row.get("model_version")?,
    })
}

fn row_to_upload(row: &Row<'_>) -> Result<UploadRecord, MoodError> {
    let id: String = row.get("id")?;
    let user_id: String = row.get("user_id")?;
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(UploadRecord {
        id: Uuid::parse_str(&id)
            .map_err(|err| MoodError::Storage(format!("invalid upload id '{id}': {err}")))?,
        user_id: UserId::new(user_id),
        filename: row.get("filename")?,
        content_hash: row.get("content_hash")?,
        status: status.parse()?,
        error: row.get("error")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

fn row_to_label(row: &Row<'_>) -> Result<MoodLabel, MoodError> {
    let created_at: String = row.get("created_at")?;
    Ok(MoodLabel {
        date: row_date(row)?,
        mood: row.get("mood")?,
        note: row.get("note")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

fn upsert_sleep(conn: &Connection, user: &UserId, incoming: SleepSummary) -> Result<(), MoodError> {
    let date = format_date(incoming.date);
    let existing = query_one(
        conn,
        "SELECT * FROM sleep_summary WHERE user_id = ?1 AND date = ?2",
        params![user.as_str(), date],
        row_to_sleep,
    )?;
    let row = match existing {
        Some(existing) => SleepSummary::merge(existing, incoming),
        None => incoming,
    };

    conn.execute(
        "INSERT OR REPLACE INTO sleep_summary (
            user_id, date, total_sleep_minutes, deep_sleep_minutes, light_sleep_minutes,
            rem_sleep_minutes, awake_minutes, sleep_score, bedtime, wake_time
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            user.as_str(),
            date,
            row.total_sleep_minutes,
            row.deep_sleep_minutes,
            row.light_sleep_minutes,
            row.rem_sleep_minutes,
            row.awake_minutes,
            row.sleep_score,
            row.bedtime.map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
            row.wake_time.map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
        ],
    )?;
    Ok(())
}

fn upsert_physiology(
    conn: &Connection,
    user: &UserId,
    incoming: DailyPhysiology,
) -> Result<(), MoodError> {
    let date = format_date(incoming.date);
    let existing = query_one(
        conn,
        "SELECT * FROM daily_physiology WHERE user_id = ?1 AND date = ?2",
        params![user.as_str(), date],
        row_to_physiology,
    )?;
    let row = match existing {
        Some(existing) => DailyPhysiology::merge(existing, incoming),
        None => incoming,
    };

    conn.execute(
        "INSERT OR REPLACE INTO daily_physiology (user_id, date, resting_hr, respiration_rate, hrv_rmssd)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user.as_str(), date, row.resting_hr, row.respiration_rate, row.hrv_rmssd],
    )?;
    Ok(())
}

fn upsert_activity(
    conn: &Connection,
    user: &UserId,
    incoming: DailyActivity,
) -> Result<(), MoodError> {
    let date = format_date(incoming.date);
    let existing = query_one(
        conn,
        "SELECT * FROM daily_activity WHERE user_id = ?1 AND date = ?2",
        params![user.as_str(), date],
        row_to_activity,
    )?;
    let row = match existing {
        Some(existing) => DailyActivity::merge(existing, incoming),
        None => incoming,
    };

    conn.execute(
        "INSERT OR REPLACE INTO daily_activity (user_id, date, steps, active_minutes, calories, distance_meters)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user.as_str(),
            date,
            row.steps,
            row.active_minutes,
            row.calories,
            row.distance_meters
        ],
    )?;
    Ok(())
}

fn upsert_stress(conn: &Connection, user: &UserId, incoming: DailyStress) -> Result<(), MoodError> {
    let date = format_date(incoming.date);
    let existing = query_one(
        conn,
        "SELECT * FROM daily_stress WHERE user_id = ?1 AND date = ?2 AND stress_type = ?3",
        params![user.as_str(), date, incoming.stress_type],
        row_to_stress,
    )?;
    let row = match existing {
        Some(existing) => DailyStress::merge(existing, incoming),
        None => incoming,
    };

    conn.execute(
        "INSERT OR REPLACE INTO daily_stress (
            user_id, date, stress_type, avg_stress, max_stress, stress_duration_secs, rest_duration_secs
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user.as_str(),
            date,
            row.stress_type,
            row.avg_stress,
            row.max_stress,
            row.stress_duration_secs,
            row.rest_duration_secs
        ],
    )?;
    Ok(())
}

fn upsert_body_battery(
    conn: &Connection,
    user: &UserId,
    incoming: BodyBatteryStat,
) -> Result<(), MoodError> {
    let date = format_date(incoming.date);
    let existing = query_one(
        conn,
        "SELECT * FROM daily_body_battery WHERE user_id = ?1 AND date = ?2 AND stat_type = ?3",
        params![user.as_str(), date, incoming.stat_type],
        row_to_body_battery,
    )?;
    let row = match existing {
        Some(existing) => BodyBatteryStat::merge(existing, incoming),
        None => incoming,
    };

    conn.execute(
        "INSERT OR REPLACE INTO daily_body_battery (user_id, date, stat_type, value)
         VALUES (?1, ?2, ?3, ?4)",
        params![user.as_str(), date, row.stat_type, row.value],
    )?;
    Ok(())
}

const SIGNAL_DATES_SQL: &str = "
    SELECT date FROM sleep_summary WHERE user_id = ?1
    UNION SELECT date FROM daily_physiology WHERE user_id = ?1
    UNION SELECT date FROM daily_activity WHERE user_id = ?1
    UNION SELECT date FROM daily_stress WHERE user_id = ?1";

impl SignalStore for SqliteStore {
    fn upsert_signal(&self, user: &UserId, row: CanonicalRow) -> Result<(), MoodError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        match row {
            CanonicalRow::Sleep(r) => upsert_sleep(&tx, user, r)?,
            CanonicalRow::Physiology(r) => upsert_physiology(&tx, user, r)?,
            CanonicalRow::Activity(r) => upsert_activity(&tx, user, r)?,
            CanonicalRow::Stress(r) => upsert_stress(&tx, user, r)?,
            CanonicalRow::BodyBattery(r) => upsert_body_battery(&tx, user, r)?,
        }
        tx.commit()?;
        Ok(())
    }

    fn signal_dates(&self, user: &UserId) -> Result<Vec<NaiveDate>, MoodError> {
        let conn = self.conn()?;
        query_all(
            &conn,
            &format!("{SIGNAL_DATES_SQL} ORDER BY date"),
            params![user.as_str()],
            row_date,
        )
    }

    fn day_signals(
        &self,
        user: &UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DaySignals>, MoodError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT d.date AS date,
                    ss.total_sleep_minutes AS total_sleep_minutes,
                    dp.hrv_rmssd AS hrv_rmssd,
                    dp.resting_hr AS resting_hr,
                    da.steps AS steps,
                    da.active_minutes AS active_minutes,
                    ds.avg_stress AS avg_stress
             FROM ({SIGNAL_DATES_SQL}) d
             LEFT JOIN sleep_summary ss ON ss.user_id = ?1 AND ss.date = d.date
             LEFT JOIN daily_physiology dp ON dp.user_id = ?1 AND dp.date = d.date
             LEFT JOIN daily_activity da ON da.user_id = ?1 AND da.date = d.date
             LEFT JOIN daily_stress ds
                ON ds.user_id = ?1 AND ds.date = d.date AND ds.stress_type = ?4
             WHERE d.date >= ?2 AND d.date < ?3
             ORDER BY d.date"
        );
        query_all(
            &conn,
            &sql,
            params![
                user.as_str(),
                format_date(start),
                format_date(end),
                TOTAL_STRESS_TYPE
            ],
            row_to_day_signals,
        )
    }

    fn upsert_features(&self, user: &UserId, row: &DerivedFeatureRow) -> Result<(), MoodError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO daily_features (
                user_id, date, sleep_debt_minutes, sleep_vs_baseline_pct, hrv_rmssd_zscore,
                resting_hr_delta, stress_percentile, steps_vs_baseline_pct, active_minutes_delta,
                baseline_window_days, computed_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                user.as_str(),
                format_date(row.date),
                row.sleep_debt_minutes,
                row.sleep_vs_baseline_pct,
                row.hrv_rmssd_zscore,
                row.resting_hr_delta,
                row.stress_percentile,
                row.steps_vs_baseline_pct,
                row.active_minutes_delta,
                row.baseline_window_days,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn features(
        &self,
        user: &UserId,
        date: NaiveDate,
    ) -> Result<Option<DerivedFeatureRow>, MoodError> {
        let conn = self.conn()?;
        query_one(
            &conn,
            "SELECT * FROM daily_features WHERE user_id = ?1 AND date = ?2",
            params![user.as_str(), format_date(date)],
            row_to_features,
        )
    }

    fn upsert_prediction(&self, user: &UserId, prediction: &Prediction) -> Result<(), MoodError> {
        let explanation = serde_json::to_string(&prediction.explanation)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO predictions (
                user_id, date, predicted_mood, predicted_mood_discrete, confidence,
                explanation, model_version, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user.as_str(),
                format_date(prediction.date),
                prediction.predicted_mood,
                prediction.predicted_mood_discrete,
                prediction.confidence.as_str(),
                explanation,
                prediction.model_version,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn prediction(&self, user: &UserId, date: NaiveDate) -> Result<Option<Prediction>, MoodError> {
        let conn = self.conn()?;
        query_one(
            &conn,
            "SELECT * FROM predictions WHERE user_id = ?1 AND date = ?2",
            params![user.as_str(), format_date(date)],
            row_to_prediction,
        )
    }

    fn predictions(
        &self,
        user: &UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Prediction>, MoodError> {
        let conn = self.conn()?;
        query_all(
            &conn,
            "SELECT * FROM predictions
             WHERE user_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date",
            params![user.as_str(), format_date(start), format_date(end)],
            row_to_prediction,
        )
    }

    fn admit_upload(
        &self,
        user: &UserId,
        filename: &str,
        content_hash: &str,
    ) -> Result<bool, MoodError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO uploads (id, user_id, filename, content_hash, status, error, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'processing', NULL, ?5, ?5)
             ON CONFLICT (user_id, content_hash) DO NOTHING",
            params![
                Uuid::new_v4().to_string(),
                user.as_str(),
                filename,
                content_hash,
                now
            ],
        )?;
        Ok(inserted == 1)
    }

    fn reopen_failed_upload(
        &self,
        user: &UserId,
        filename: &str,
        content_hash: &str,
    ) -> Result<bool, MoodError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE uploads
             SET status = 'processing', error = NULL, filename = ?3, updated_at = ?4
             WHERE user_id = ?1 AND content_hash = ?2 AND status = 'failed'",
            params![user.as_str(), content_hash, filename, Utc::now().to_rfc3339()],
        )?;
        Ok(updated == 1)
    }

    fn complete_upload(
        &self,
        user: &UserId,
        content_hash: &str,
        status: UploadStatus,
        error: Option<&str>,
    ) -> Result<(), MoodError> {
        require_terminal(status)?;
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE uploads
             SET status = ?3, error = ?4, updated_at = ?5
             WHERE user_id = ?1 AND content_hash = ?2 AND status = 'processing'",
            params![
                user.as_str(),
                content_hash,
                status.as_str(),
                error,
                Utc::now().to_rfc3339()
            ],
        )?;
        if updated == 1 {
            Ok(())
        } else {
            Err(MoodError::Ledger(format!(
                "no processing upload {content_hash} for user {user}"
            )))
        }
    }

    fn upload(
        &self,
        user: &UserId,
        content_hash: &str,
    ) -> Result<Option<UploadRecord>, MoodError> {
        let conn = self.conn()?;
        query_one(
            &conn,
            "SELECT * FROM uploads WHERE user_id = ?1 AND content_hash = ?2",
            params![user.as_str(), content_hash],
            row_to_upload,
        )
    }

    fn upsert_mood_label(&self, user: &UserId, label: &MoodLabel) -> Result<(), MoodError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO mood_labels (user_id, date, mood, note, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.as_str(),
                format_date(label.date),
                label.mood,
                label.note,
                label.created_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn mood_labels(
        &self,
        user: &UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MoodLabel>, MoodError> {
        let conn = self.conn()?;
        query_all(
            &conn,
            "SELECT * FROM mood_labels
             WHERE user_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date",
            params![user.as_str(), format_date(start), format_date(end)],
            row_to_label,
        )
    }
}
