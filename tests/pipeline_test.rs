//! End-to-end upload scenarios against both storage backends.

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use synheart_mood::ledger::content_hash;
use synheart_mood::query::{history, today, DayStatus, TodayStatus};
use synheart_mood::types::{
    CanonicalRow, DaySignals, DerivedFeatureRow, MoodLabel, Prediction, UploadRecord,
    UploadStatus,
};
use synheart_mood::{
    MemoryStore, MoodError, MoodPipeline, SignalStore, SqliteStore, UploadFile, UserId,
};

const SLEEP: &str = r#"[
    {
        "calendarDate": "2025-10-01",
        "sleepStartTimestampGMT": "2025-09-30T22:30:00.0",
        "sleepEndTimestampGMT": "2025-10-01T06:30:00.0",
        "deepSleepSeconds": 6000,
        "lightSleepSeconds": 18000,
        "remSleepSeconds": 4800,
        "awakeSleepSeconds": 900
    },
    {
        "calendarDate": "2025-10-02",
        "sleepStartTimestampGMT": "2025-10-01T23:00:00.0",
        "sleepEndTimestampGMT": "2025-10-02T05:00:00.0",
        "deepSleepSeconds": 0,
        "lightSleepSeconds": 0,
        "remSleepSeconds": 0,
        "awakeSleepSeconds": 2400
    }
]"#;

const HEALTH_FULL: &str = r#"[
    {"calendarDate": "2025-10-03", "metrics": [
        {"type": "HR", "value": 55.0}, {"type": "HRV", "value": 47.0}
    ]},
    {"calendarDate": "2025-10-04", "metrics": [
        {"type": "HR", "value": 57.0}, {"type": "HRV", "value": 44.0}
    ]}
]"#;

const HEALTH_HR_ONLY: &str = r#"[
    {"calendarDate": "2025-10-03", "metrics": [{"type": "HR", "value": 53.0}]}
]"#;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, d).unwrap()
}

fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, body) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Run a scenario once per backend
macro_rules! on_both_stores {
    ($test:ident, $scenario:ident) => {
        #[test]
        fn $test() {
            $scenario(MoodPipeline::new(MemoryStore::new()));

            let dir = tempfile::tempdir().unwrap();
            let store = SqliteStore::open(dir.path().join("mood.db")).unwrap();
            $scenario(MoodPipeline::new(store));
        }
    };
}

on_both_stores!(test_zip_with_seen_and_new_member, zip_with_seen_and_new_member);

fn zip_with_seen_and_new_member<S: SignalStore>(pipeline: MoodPipeline<S>) {
    let user = UserId::new("u1");
    pipeline
        .process_upload(&user, vec![UploadFile::new("a_sleepData.json", SLEEP)])
        .unwrap();

    let archive = zip_of(&[
        ("DI_CONNECT/a_sleepData.json", SLEEP),
        ("DI_CONNECT/b_healthStatusData.json", HEALTH_FULL),
        ("DI_CONNECT/README.txt", "not an export"),
    ]);
    let summary = pipeline
        .process_upload(&user, vec![UploadFile::new("export.zip", archive)])
        .unwrap();

    assert_eq!(summary.duplicates, vec!["a_sleepData.json"]);
    assert_eq!(summary.admitted, vec!["b_healthStatusData.json"]);
    assert_eq!(summary.days_ingested, 2);

    let store = pipeline.store();
    let old = store.upload(&user, &content_hash(SLEEP.as_bytes())).unwrap().unwrap();
    let new = store
        .upload(&user, &content_hash(HEALTH_FULL.as_bytes()))
        .unwrap()
        .unwrap();
    assert_eq!(old.status, UploadStatus::Success);
    assert_eq!(new.status, UploadStatus::Success);
    assert_eq!(new.filename, "b_healthStatusData.json");
}

on_both_stores!(test_hr_only_file_keeps_earlier_hrv, hr_only_file_keeps_earlier_hrv);

fn hr_only_file_keeps_earlier_hrv<S: SignalStore>(pipeline: MoodPipeline<S>) {
    let user = UserId::new("u1");
    pipeline
        .process_upload(&user, vec![UploadFile::new("1_healthStatusData.json", HEALTH_FULL)])
        .unwrap();
    pipeline
        .process_upload(&user, vec![UploadFile::new("2_healthStatusData.json", HEALTH_HR_ONLY)])
        .unwrap();

    let signals = pipeline.store().day_signals(&user, day(3), day(4)).unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].resting_hr, Some(53.0));
    assert_eq!(signals[0].hrv_rmssd, Some(47.0));
}

on_both_stores!(test_zero_sleep_record_is_dropped, zero_sleep_record_is_dropped);

fn zero_sleep_record_is_dropped<S: SignalStore>(pipeline: MoodPipeline<S>) {
    let user = UserId::new("u1");
    let summary = pipeline
        .process_upload(&user, vec![UploadFile::new("a_sleepData.json", SLEEP)])
        .unwrap();
    assert_eq!(summary.days_ingested, 1);

    let store = pipeline.store();
    assert_eq!(store.signal_dates(&user).unwrap(), vec![day(1)]);
    assert!(store.prediction(&user, day(1)).unwrap().is_some());
    assert!(store.prediction(&user, day(2)).unwrap().is_none());

    let response = history(store, &user, day(1), day(2)).unwrap();
    assert_eq!(response.days[0].status, DayStatus::Available);
    assert_eq!(response.days[1].status, DayStatus::Missing);
    assert_eq!(
        today(store, &user, day(2)).unwrap().status,
        TodayStatus::NotComputed
    );
}

on_both_stores!(test_recompute_is_idempotent, recompute_is_idempotent);

fn recompute_is_idempotent<S: SignalStore>(pipeline: MoodPipeline<S>) {
    let user = UserId::new("u1");
    pipeline
        .process_upload(
            &user,
            vec![
                UploadFile::new("a_sleepData.json", SLEEP),
                UploadFile::new("b_healthStatusData.json", HEALTH_FULL),
            ],
        )
        .unwrap();

    let store = pipeline.store();
    let before: Vec<_> = [day(1), day(3), day(4)]
        .iter()
        .map(|d| store.features(&user, *d).unwrap().unwrap())
        .collect();
    let predictions_before = store.predictions(&user, day(1), day(4)).unwrap();

    assert_eq!(pipeline.recompute_user(&user).unwrap(), 3);

    let after: Vec<_> = [day(1), day(3), day(4)]
        .iter()
        .map(|d| store.features(&user, *d).unwrap().unwrap())
        .collect();
    assert_eq!(after, before);
    assert_eq!(store.predictions(&user, day(1), day(4)).unwrap(), predictions_before);
}

on_both_stores!(test_users_are_isolated, users_are_isolated);

fn users_are_isolated<S: SignalStore>(pipeline: MoodPipeline<S>) {
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");
    pipeline
        .process_upload(
            &alice,
            vec![
                UploadFile::new("a_sleepData.json", SLEEP),
                UploadFile::new("b_healthStatusData.json", HEALTH_FULL),
            ],
        )
        .unwrap();

    // Same bytes from another user are not a duplicate
    let summary = pipeline
        .process_upload(&bob, vec![UploadFile::new("a_sleepData.json", SLEEP)])
        .unwrap();
    assert_eq!(summary.admitted.len(), 1);

    let store = pipeline.store();
    assert_eq!(store.signal_dates(&bob).unwrap(), vec![day(1)]);
    assert_eq!(store.signal_dates(&alice).unwrap(), vec![day(1), day(3), day(4)]);
    assert!(store.prediction(&bob, day(3)).unwrap().is_none());
}

/// Delegates to a [`MemoryStore`] but can fail feature writes and ledger
/// finalization on demand
struct FlakyStore {
    inner: MemoryStore,
    fail_features: AtomicBool,
    fail_next_complete: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_features: AtomicBool::new(false),
            fail_next_complete: AtomicBool::new(false),
        }
    }
}

impl SignalStore for FlakyStore {
    fn upsert_signal(&self, user: &UserId, row: CanonicalRow) -> Result<(), MoodError> {
        self.inner.upsert_signal(user, row)
    }

    fn signal_dates(&self, user: &UserId) -> Result<Vec<NaiveDate>, MoodError> {
        self.inner.signal_dates(user)
    }

    fn day_signals(
        &self,
        user: &UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DaySignals>, MoodError> {
        self.inner.day_signals(user, start, end)
    }

    fn upsert_features(&self, user: &UserId, row: &DerivedFeatureRow) -> Result<(), MoodError> {
        if self.fail_features.load(Ordering::SeqCst) {
            return Err(MoodError::Storage("disk full".to_string()));
        }
        self.inner.upsert_features(user, row)
    }

    fn features(
        &self,
        user: &UserId,
        date: NaiveDate,
    ) -> Result<Option<DerivedFeatureRow>, MoodError> {
        self.inner.features(user, date)
    }

    fn upsert_prediction(&self, user: &UserId, prediction: &Prediction) -> Result<(), MoodError> {
        self.inner.upsert_prediction(user, prediction)
    }

    fn prediction(&self, user: &UserId, date: NaiveDate) -> Result<Option<Prediction>, MoodError> {
        self.inner.prediction(user, date)
    }

    fn predictions(
        &self,
        user: &UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Prediction>, MoodError> {
        self.inner.predictions(user, start, end)
    }

    fn admit_upload(
        &self,
        user: &UserId,
        filename: &str,
        content_hash: &str,
    ) -> Result<bool, MoodError> {
        self.inner.admit_upload(user, filename, content_hash)
    }

    fn reopen_failed_upload(
        &self,
        user: &UserId,
        filename: &str,
        content_hash: &str,
    ) -> Result<bool, MoodError> {
        self.inner.reopen_failed_upload(user, filename, content_hash)
    }

    fn complete_upload(
        &self,
        user: &UserId,
        content_hash: &str,
        status: UploadStatus,
        error: Option<&str>,
    ) -> Result<(), MoodError> {
        if self.fail_next_complete.swap(false, Ordering::SeqCst) {
            return Err(MoodError::Storage("transient ledger write error".to_string()));
        }
        self.inner.complete_upload(user, content_hash, status, error)
    }

    fn upload(&self, user: &UserId, content_hash: &str) -> Result<Option<UploadRecord>, MoodError> {
        self.inner.upload(user, content_hash)
    }

    fn upsert_mood_label(&self, user: &UserId, label: &MoodLabel) -> Result<(), MoodError> {
        self.inner.upsert_mood_label(user, label)
    }

    fn mood_labels(
        &self,
        user: &UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MoodLabel>, MoodError> {
        self.inner.mood_labels(user, start, end)
    }
}

#[test]
fn test_failure_marks_every_admitted_file_failed() {
    let store = FlakyStore::new();
    store.fail_features.store(true, Ordering::SeqCst);
    let pipeline = MoodPipeline::new(store);
    let user = UserId::new("u1");
    let files = vec![
        UploadFile::new("a_sleepData.json", SLEEP),
        UploadFile::new("b_healthStatusData.json", HEALTH_FULL),
    ];

    let result = pipeline.process_upload(&user, files.clone());
    let Err(MoodError::Pipeline { message }) = result else {
        panic!("expected a pipeline error");
    };
    assert!(message.contains("disk full"));

    for body in [SLEEP, HEALTH_FULL] {
        let record: UploadRecord = pipeline
            .store()
            .upload(&user, &content_hash(body.as_bytes()))
            .unwrap()
            .unwrap();
        assert_eq!(record.status, UploadStatus::Failed);
        assert!(record.error.as_deref().unwrap_or_default().contains("disk full"));
    }

    // Without retry the failed files are refused
    pipeline.store().fail_features.store(false, Ordering::SeqCst);
    let refused = pipeline.process_upload(&user, files.clone()).unwrap();
    assert_eq!(refused.duplicates.len(), 2);

    let pipeline = pipeline.retry_failed_uploads(true);
    let retried = pipeline.process_upload(&user, files).unwrap();
    assert_eq!(retried.admitted.len(), 2);
    assert_eq!(retried.days_ingested, 3);
    let record = pipeline
        .store()
        .upload(&user, &content_hash(SLEEP.as_bytes()))
        .unwrap()
        .unwrap();
    assert_eq!(record.status, UploadStatus::Success);
}

#[test]
fn test_ledger_write_failure_does_not_strand_uploads() {
    let store = FlakyStore::new();
    store.fail_next_complete.store(true, Ordering::SeqCst);
    let pipeline = MoodPipeline::new(store).retry_failed_uploads(true);
    let user = UserId::new("u1");
    let files = vec![
        UploadFile::new("a_sleepData.json", SLEEP),
        UploadFile::new("b_healthStatusData.json", HEALTH_FULL),
    ];

    let result = pipeline.process_upload(&user, files.clone());
    let Err(MoodError::Pipeline { message }) = result else {
        panic!("expected a pipeline error");
    };
    assert!(message.contains("transient ledger write error"));

    // The first finalization failed, the second still went through
    let status = |body: &str| {
        pipeline
            .store()
            .upload(&user, &content_hash(body.as_bytes()))
            .unwrap()
            .map(|r| r.status)
    };
    assert_eq!(status(SLEEP), Some(UploadStatus::Failed));
    assert_eq!(status(HEALTH_FULL), Some(UploadStatus::Success));

    // Nothing is left in processing, so the failed file can be resubmitted
    let retried = pipeline.process_upload(&user, files).unwrap();
    assert_eq!(retried.admitted, vec!["a_sleepData.json"]);
    assert_eq!(retried.duplicates, vec!["b_healthStatusData.json"]);
    assert_eq!(status(SLEEP), Some(UploadStatus::Success));
}
