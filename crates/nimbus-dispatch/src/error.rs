//! Dispatcher error types.

use thiserror::Error;

/// Errors that can occur while dispatching requests.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no available server")]
    NoAvailableServer,

    #[error("unknown algorithm: {0}")]
    InvalidAlgorithm(String),

    #[error("unknown server: {0}")]
    UnknownServer(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
