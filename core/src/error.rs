use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Table contract violation: {0}")]
    ContractViolation(String),

    #[error("Event index {index} out of bounds (table has {len} events)")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Malformed input file: {0}")]
    MalformedInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type AuditResult<T> = Result<T, AuditError>;
