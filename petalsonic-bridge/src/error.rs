//! Error types for PetalSonic Bridge

use crate::backend::BackendError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Pool exhausted: {pool} (capacity {capacity})")]
    PoolExhausted { pool: &'static str, capacity: usize },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Thread error: {0}")]
    Thread(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Outcome of a request that was forwarded to the backend.
///
/// Backend failures are absorbed at the bridge boundary and reported through this type
/// instead of an error, so callers degrade to silence rather than unwinding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Success,
    Failure,
}

impl RequestStatus {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl<T, E> From<std::result::Result<T, E>> for RequestStatus {
    fn from(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(_) => Self::Failure,
        }
    }
}

/// Outcome of executing a trigger on an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerResult {
    /// The event was posted and is audible.
    Playing,
    /// The event was posted but starts out beyond its attenuation radius.
    Virtual,
    /// The backend rejected the event; nothing was retained.
    Failure,
}

impl TriggerResult {
    pub fn is_success(self) -> bool {
        !matches!(self, Self::Failure)
    }
}
