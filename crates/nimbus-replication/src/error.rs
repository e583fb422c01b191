//! Replication engine error types.

use thiserror::Error;

/// Errors that can occur while replicating or reading data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplicationError {
    #[error("data not found: {0}")]
    DataNotFound(String),

    #[error("no available region holds key: {0}")]
    NoAvailableRegion(String),

    #[error("unknown region: {0}")]
    UnknownRegion(String),

    #[error("simulated write of {key} to {region} failed")]
    WriteFailed { key: String, region: String },

    #[error("simulated read of {key} from {region} failed")]
    ReadFailed { key: String, region: String },
}

pub type ReplicationResult<T> = Result<T, ReplicationError>;
