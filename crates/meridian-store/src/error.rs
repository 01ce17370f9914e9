use thiserror::Error;

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("counter file corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record corrupt at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },

    #[error("no record for run {run_number} unit {unit}")]
    NotFound { run_number: u32, unit: u8 },
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("header serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}
