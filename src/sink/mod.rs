use std::{
    collections::HashSet,
    future::Future,
    path::PathBuf,
    sync::Mutex,
    time::Duration,
};

use indexmap::IndexMap;
use log::{info, warn};

use crate::{
    error::AgentError,
    event::{CaptureEvent, PlateRecord},
};

pub mod csv;
pub mod db;
pub mod rest;

/// Durable-sink seam. Backends are interchangeable behind this trait.
#[allow(async_fn_in_trait)]
pub trait EventSink {
    async fn record(&self, record: &PlateRecord) -> Result<(), AgentError>;
}

/// The configured backend, one per process.
pub enum Sink {
    Database(db::DatabaseSink),
    Rest(rest::RestSink),
    Csv(csv::CsvSink),
}

impl EventSink for Sink {
    async fn record(&self, record: &PlateRecord) -> Result<(), AgentError> {
        match self {
            Sink::Database(sink) => sink.record(record).await,
            Sink::Rest(sink) => sink.record(record).await,
            Sink::Csv(sink) => sink.record(record).await,
        }
    }
}

/// Bounded-attempts-then-fail retry, used by the REST backend. Distinct
/// from the database connect policy, which retries indefinitely; the two
/// sinks carry different trust levels on purpose.
pub async fn retry_bounded<T, F, Fut>(
    attempts: usize,
    delay: Duration,
    mut op: F,
) -> Result<T, AgentError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AgentError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                warn!("attempt {attempt}/{attempts} failed: {e}");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

pub enum RecordOutcome {
    Persisted,
    /// Plate text was in the excluded sentinel set; snapshot saved, sink
    /// skipped.
    SentinelSkipped,
    /// Plate already recorded in this process lifetime.
    Duplicate,
}

/// Owns the disk write, the sentinel filter, and the optional in-memory
/// de-duplication set (process lifetime only, cleared by restart).
pub struct Recorder<S> {
    snapshot_dir: PathBuf,
    locations: IndexMap<String, String>,
    dedup: Option<Mutex<HashSet<String>>>,
    sink: S,
}

impl<S: EventSink> Recorder<S> {
    pub fn new(
        snapshot_dir: PathBuf,
        locations: IndexMap<String, String>,
        dedup_plates: bool,
        sink: S,
    ) -> Recorder<S> {
        Recorder {
            snapshot_dir,
            locations,
            dedup: dedup_plates.then(|| Mutex::new(HashSet::new())),
            sink,
        }
    }

    pub async fn record(&self, event: &CaptureEvent) -> Result<RecordOutcome, AgentError> {
        // The snapshot hits disk before any durable-sink call, for every
        // backend and regardless of sentinel/dedup outcome.
        let saved_path = event.saved_image_path(&self.snapshot_dir);
        tokio::fs::write(&saved_path, &event.image).await?;
        info!("{}: snapshot saved to {}", event.lane, saved_path.display());

        if event.reading.is_excluded() {
            info!(
                "{}: plate '{}' excluded from durable sink",
                event.lane, event.reading.plate_text
            );
            return Ok(RecordOutcome::SentinelSkipped);
        }
        if self.already_recorded(&event.reading.plate_text) {
            info!(
                "{}: plate '{}' already registered, skipping",
                event.lane, event.reading.plate_text
            );
            return Ok(RecordOutcome::Duplicate);
        }

        let record = event.to_record(&self.locations, &saved_path);
        self.sink.record(&record).await?;
        // Marked seen only after the sink accepted it, so a failed insert
        // can be retried by a later cycle.
        self.mark_recorded(&event.reading.plate_text);
        Ok(RecordOutcome::Persisted)
    }

    fn already_recorded(&self, plate: &str) -> bool {
        match &self.dedup {
            Some(seen) => seen.lock().unwrap().contains(plate),
            None => false,
        }
    }

    fn mark_recorded(&self, plate: &str) {
        if let Some(seen) = &self.dedup {
            seen.lock().unwrap().insert(plate.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carmen::{PlateReading, NO_PLATE};
    use crate::event::PlateRecord;
    use bytes::Bytes;
    use chrono::Local;

    struct FakeSink {
        records: Mutex<Vec<PlateRecord>>,
        fail: bool,
    }

    impl FakeSink {
        fn new() -> FakeSink {
            FakeSink {
                records: Mutex::new(vec![]),
                fail: false,
            }
        }

        fn failing() -> FakeSink {
            FakeSink {
                records: Mutex::new(vec![]),
                fail: true,
            }
        }
    }

    impl EventSink for FakeSink {
        async fn record(&self, record: &PlateRecord) -> Result<(), AgentError> {
            if self.fail {
                return Err(AgentError::Persistence("sink down".to_string()));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn event(plate: &str) -> CaptureEvent {
        CaptureEvent {
            lane: "entrada".to_string(),
            mac_address: "6c:f1:7e:1f:8e:b7".to_string(),
            captured_at: Local::now(),
            reading: PlateReading {
                plate_text: plate.to_string(),
                attributes: None,
            },
            image: Bytes::from_static(b"\xFF\xD8\xFF\xE0"),
        }
    }

    fn recorder(dir: &std::path::Path, dedup: bool, sink: FakeSink) -> Recorder<FakeSink> {
        Recorder::new(dir.to_path_buf(), IndexMap::new(), dedup, sink)
    }

    #[tokio::test]
    async fn persists_normal_plate_and_saves_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder(dir.path(), false, FakeSink::new());
        let event = event("ABC123");
        let outcome = recorder.record(&event).await.unwrap();
        assert!(matches!(outcome, RecordOutcome::Persisted));
        let records = recorder.sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].placa, "ABC123");
        assert!(event.saved_image_path(dir.path()).exists());
    }

    #[tokio::test]
    async fn sentinel_plate_skips_sink_but_saves_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder(dir.path(), false, FakeSink::new());
        let event = event(NO_PLATE);
        let outcome = recorder.record(&event).await.unwrap();
        assert!(matches!(outcome, RecordOutcome::SentinelSkipped));
        assert!(recorder.sink.records.lock().unwrap().is_empty());
        assert!(event.saved_image_path(dir.path()).exists());
    }

    #[tokio::test]
    async fn dedup_suppresses_second_identical_plate() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder(dir.path(), true, FakeSink::new());
        assert!(matches!(
            recorder.record(&event("ABC123")).await.unwrap(),
            RecordOutcome::Persisted
        ));
        assert!(matches!(
            recorder.record(&event("ABC123")).await.unwrap(),
            RecordOutcome::Duplicate
        ));
        assert!(matches!(
            recorder.record(&event("XYZ789")).await.unwrap(),
            RecordOutcome::Persisted
        ));
        assert_eq!(recorder.sink.records.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_sink_leaves_plate_unmarked() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder(dir.path(), true, FakeSink::failing());
        assert!(recorder.record(&event("ABC123")).await.is_err());
        assert!(!recorder.already_recorded("ABC123"));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_bounded_stops_after_configured_attempts() {
        let calls = Mutex::new(0usize);
        let result: Result<(), _> = retry_bounded(5, Duration::from_secs(2), || async {
            *calls.lock().unwrap() += 1;
            Err(AgentError::Persistence("HTTP status 500".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(*calls.lock().unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_bounded_returns_first_success() {
        let calls = Mutex::new(0usize);
        let result = retry_bounded(5, Duration::from_secs(2), || async {
            let mut calls = calls.lock().unwrap();
            *calls += 1;
            if *calls < 3 {
                Err(AgentError::Persistence("HTTP status 500".to_string()))
            } else {
                Ok(*calls)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(*calls.lock().unwrap(), 3);
    }
}
