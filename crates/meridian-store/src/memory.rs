//! In-memory backends for tests.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use meridian_proto::UnitId;

use crate::error::{CounterError, LedgerError};
use crate::traits::{ExposureLedger, RunCounter};
use crate::types::ExposureRecord;

#[derive(Debug, Default)]
pub struct MemoryRunCounter {
    value: AtomicU32,
}

impl MemoryRunCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn starting_at(value: u32) -> Self {
        Self {
            value: AtomicU32::new(value),
        }
    }
}

#[async_trait]
impl RunCounter for MemoryRunCounter {
    async fn current(&self) -> Result<u32, CounterError> {
        Ok(self.value.load(Ordering::SeqCst))
    }

    async fn next(&self) -> Result<u32, CounterError> {
        Ok(self.value.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<ExposureRecord>>,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record, for assertions.
    pub async fn all(&self) -> Vec<ExposureRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl ExposureLedger for MemoryLedger {
    async fn append(&self, record: ExposureRecord) -> Result<(), LedgerError> {
        self.records.lock().await.push(record);
        Ok(())
    }

    async fn mark_completed(&self, run_number: u32, unit: UnitId) -> Result<(), LedgerError> {
        let mut records = self.records.lock().await;
        match records
            .iter_mut()
            .rev()
            .find(|r| r.run_number == Some(run_number) && r.unit == unit)
        {
            Some(record) => {
                record.completed = true;
                record.finished = Some(Utc::now());
                Ok(())
            }
            None => Err(LedgerError::NotFound { run_number, unit }),
        }
    }

    async fn records_for_run(&self, run_number: u32) -> Result<Vec<ExposureRecord>, LedgerError> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| r.run_number == Some(run_number))
            .cloned()
            .collect())
    }
}
