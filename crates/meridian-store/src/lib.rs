//! Durable observatory state.
//!
//! Three concerns, each behind a trait with a file-backed implementation and
//! an in-memory one for tests:
//!
//! - **Run counter**: site-wide exposure numbering. Advanced exactly once per
//!   non-glance exposure, before the hardware is triggered, so a crash
//!   mid-exposure burns the number rather than reusing it.
//! - **Exposure ledger**: append-oriented record of every frame taken.
//! - **Image store**: raw frame pixels plus a JSON header sidecar.

mod error;
mod file;
mod image;
mod memory;
mod traits;
mod types;

pub use error::{CounterError, ImageError, LedgerError};
pub use file::{FileRunCounter, JsonlLedger};
pub use image::FsImageStore;
pub use memory::{MemoryLedger, MemoryRunCounter};
pub use traits::{ExposureLedger, RunCounter};
pub use types::ExposureRecord;
