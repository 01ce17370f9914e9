use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use meridian_proto::UnitId;

use crate::error::{CounterError, LedgerError};
use crate::traits::{ExposureLedger, RunCounter};
use crate::types::ExposureRecord;

/// File-backed run counter.
///
/// The counter value lives in a single text file. Updates go through a
/// temporary file and an atomic rename, so a crash leaves either the old or
/// the new value, never a torn write.
#[derive(Debug)]
pub struct FileRunCounter {
    path: PathBuf,
    value: Mutex<u32>,
}

impl FileRunCounter {
    /// Opens an existing counter file, or starts from 0 if absent.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CounterError> {
        let path = path.into();
        let value = match std::fs::read_to_string(&path) {
            Ok(contents) => contents
                .trim()
                .parse::<u32>()
                .map_err(|e| CounterError::Corrupt(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            value: Mutex::new(value),
        })
    }

    async fn persist(&self, value: u32) -> Result<(), CounterError> {
        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(format!("{value}\n").as_bytes()).await?;
        file.sync_all().await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl RunCounter for FileRunCounter {
    async fn current(&self) -> Result<u32, CounterError> {
        Ok(*self.value.lock().await)
    }

    async fn next(&self) -> Result<u32, CounterError> {
        let mut value = self.value.lock().await;
        let next = *value + 1;
        // Durable before visible: the returned number must survive a crash
        // even if the exposure it was allocated for never happens.
        self.persist(next).await?;
        *value = next;
        Ok(next)
    }
}

/// JSON-lines exposure ledger.
///
/// Appends are cheap; completion marking rewrites the file through a rename.
#[derive(Debug)]
pub struct JsonlLedger {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonlLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    fn load(path: &Path) -> Result<Vec<ExposureRecord>, LedgerError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|e| LedgerError::Corrupt {
                    line: i + 1,
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    async fn rewrite(&self, records: &[ExposureRecord]) -> Result<(), LedgerError> {
        let tmp = self.path.with_extension("tmp");
        let mut out = String::new();
        for record in records {
            out.push_str(&serde_json::to_string(record).map_err(|e| LedgerError::Corrupt {
                line: 0,
                reason: e.to_string(),
            })?);
            out.push('\n');
        }
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(out.as_bytes()).await?;
        file.sync_all().await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ExposureLedger for JsonlLedger {
    async fn append(&self, record: ExposureRecord) -> Result<(), LedgerError> {
        let _guard = self.guard.lock().await;
        let line = serde_json::to_string(&record).map_err(|e| LedgerError::Corrupt {
            line: 0,
            reason: e.to_string(),
        })?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn mark_completed(&self, run_number: u32, unit: UnitId) -> Result<(), LedgerError> {
        let _guard = self.guard.lock().await;
        let mut records = Self::load(&self.path)?;
        let found = records
            .iter_mut()
            .rev()
            .find(|r| r.run_number == Some(run_number) && r.unit == unit);
        match found {
            Some(record) => {
                record.completed = true;
                record.finished = Some(Utc::now());
            }
            None => return Err(LedgerError::NotFound { run_number, unit }),
        }
        self.rewrite(&records).await
    }

    async fn records_for_run(&self, run_number: u32) -> Result<Vec<ExposureRecord>, LedgerError> {
        let _guard = self.guard.lock().await;
        Ok(Self::load(&self.path)?
            .into_iter()
            .filter(|r| r.run_number == Some(run_number))
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use meridian_proto::ImageType;

    fn record(run: Option<u32>, unit: UnitId) -> ExposureRecord {
        ExposureRecord {
            run_number: run,
            unit,
            filename: format!("r{run:?}_ut{unit}.raw"),
            exptime_ms: 5000,
            binning: 1,
            image_type: ImageType::Science,
            target: Some("M31".into()),
            glance: run.is_none(),
            set_num: 1,
            set_pos: 1,
            set_tot: 1,
            pointing_id: None,
            started: Utc::now(),
            finished: None,
            completed: false,
        }
    }

    #[tokio::test]
    async fn counter_advances_by_one_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let counter = FileRunCounter::open(dir.path().join("run_number")).unwrap();

        assert_eq!(counter.current().await.unwrap(), 0);
        for expected in 1..=5 {
            assert_eq!(counter.next().await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn counter_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_number");

        {
            let counter = FileRunCounter::open(&path).unwrap();
            for _ in 0..3 {
                counter.next().await.unwrap();
            }
        }

        // A fresh handle picks up where the old one stopped: no reuse, no gap.
        let counter = FileRunCounter::open(&path).unwrap();
        assert_eq!(counter.current().await.unwrap(), 3);
        assert_eq!(counter.next().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn counter_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_number");
        std::fs::write(&path, "not a number").unwrap();

        assert!(matches!(
            FileRunCounter::open(&path),
            Err(CounterError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn ledger_append_and_complete() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JsonlLedger::new(dir.path().join("exposures.jsonl"));

        ledger.append(record(Some(42), 1)).await.unwrap();
        ledger.append(record(Some(42), 2)).await.unwrap();
        ledger.mark_completed(42, 1).await.unwrap();

        let records = ledger.records_for_run(42).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().find(|r| r.unit == 1).unwrap().completed);
        assert!(!records.iter().find(|r| r.unit == 2).unwrap().completed);
    }

    #[tokio::test]
    async fn ledger_complete_unknown_frame_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JsonlLedger::new(dir.path().join("exposures.jsonl"));

        assert!(matches!(
            ledger.mark_completed(1, 1).await,
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn ledger_glances_have_no_run_number() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JsonlLedger::new(dir.path().join("exposures.jsonl"));

        ledger.append(record(None, 1)).await.unwrap();
        assert!(ledger.records_for_run(0).await.unwrap().is_empty());
    }
}
