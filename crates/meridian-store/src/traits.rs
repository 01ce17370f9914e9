use async_trait::async_trait;

use meridian_proto::UnitId;

use crate::error::{CounterError, LedgerError};
use crate::types::ExposureRecord;

#[async_trait]
pub trait RunCounter: Send + Sync {
    /// The last allocated run number, 0 if none yet.
    async fn current(&self) -> Result<u32, CounterError>;

    /// Allocates the next run number. Must be durable before returning.
    async fn next(&self) -> Result<u32, CounterError>;
}

#[async_trait]
pub trait ExposureLedger: Send + Sync {
    async fn append(&self, record: ExposureRecord) -> Result<(), LedgerError>;

    /// Marks a frame saved. Keyed by run number and unit; glances are not
    /// tracked to completion.
    async fn mark_completed(&self, run_number: u32, unit: UnitId) -> Result<(), LedgerError>;

    async fn records_for_run(&self, run_number: u32) -> Result<Vec<ExposureRecord>, LedgerError>;
}
