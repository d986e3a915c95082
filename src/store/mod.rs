//! Canonical storage
//!
//! The pipeline only depends on the [`SignalStore`] contract: range reads by
//! date, upserts keyed by (user, date[, type]) with merge-by-coalesce for
//! signal rows, and atomic conditional writes for the upload ledger.
//!
//! Two backends are provided: [`MemoryStore`] and [`SqliteStore`].

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::MoodError;
use crate::types::{
    CanonicalRow, DaySignals, DerivedFeatureRow, MoodLabel, Prediction, UploadRecord,
    UploadStatus, UserId,
};
use chrono::NaiveDate;

/// Storage primitives the pipeline is built on.
///
/// Every method takes the user explicitly; there is no ambient user.
pub trait SignalStore {
    /// Merge `row` into the stored row for its key (see [`crate::merge`]) and write it
    fn upsert_signal(&self, user: &UserId, row: CanonicalRow) -> Result<(), MoodError>;

    /// Dates with any sleep, physiology, activity or stress row, ascending
    fn signal_dates(&self, user: &UserId) -> Result<Vec<NaiveDate>, MoodError>;

    /// Joined source series for every signal date in `[start, end)`, ascending
    fn day_signals(
        &self,
        user: &UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DaySignals>, MoodError>;

    /// Insert or replace the derived feature row for (user, row.date)
    fn upsert_features(&self, user: &UserId, row: &DerivedFeatureRow) -> Result<(), MoodError>;

    fn features(&self, user: &UserId, date: NaiveDate)
        -> Result<Option<DerivedFeatureRow>, MoodError>;

    /// Insert or replace the prediction for (user, prediction.date)
    fn upsert_prediction(&self, user: &UserId, prediction: &Prediction) -> Result<(), MoodError>;

    fn prediction(&self, user: &UserId, date: NaiveDate) -> Result<Option<Prediction>, MoodError>;

    /// Predictions in `[start, end]`, ascending
    fn predictions(
        &self,
        user: &UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Prediction>, MoodError>;

    /// Insert a `processing` ledger row unless one exists for (user, content_hash).
    ///
    /// Returns true only when this call created the row. The check and the
    /// insert are a single atomic write.
    fn admit_upload(
        &self,
        user: &UserId,
        filename: &str,
        content_hash: &str,
    ) -> Result<bool, MoodError>;

    /// Atomically move a `failed` ledger row back to `processing`.
    ///
    /// Returns false when the row is missing or not failed.
    fn reopen_failed_upload(
        &self,
        user: &UserId,
        filename: &str,
        content_hash: &str,
    ) -> Result<bool, MoodError>;

    /// Move exactly one `processing` ledger row to a terminal status
    fn complete_upload(
        &self,
        user: &UserId,
        content_hash: &str,
        status: UploadStatus,
        error: Option<&str>,
    ) -> Result<(), MoodError>;

    fn upload(&self, user: &UserId, content_hash: &str)
        -> Result<Option<UploadRecord>, MoodError>;

    /// Insert or replace the self-reported mood for (user, label.date)
    fn upsert_mood_label(&self, user: &UserId, label: &MoodLabel) -> Result<(), MoodError>;

    /// Mood labels in `[start, end]`, ascending
    fn mood_labels(
        &self,
        user: &UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MoodLabel>, MoodError>;
}

fn require_terminal(status: UploadStatus) -> Result<(), MoodError> {
    if status.is_terminal() {
        Ok(())
    } else {
        Err(MoodError::Ledger(format!(
            "cannot complete an upload with non-terminal status '{}'",
            status.as_str()
        )))
    }
}
