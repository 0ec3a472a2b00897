//! Dispatcher error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] stevedore_db::DbError),

    #[error(transparent)]
    Backend(#[from] stevedore_backend::BackendError),

    #[error("cannot take dispatch lock: {0}")]
    Lock(String),
}

impl DispatchError {
    /// The run-discovery poll window was exhausted: a protocol
    /// anomaly the operator should hear about, not a routine failure.
    pub fn is_protocol_anomaly(&self) -> bool {
        matches!(
            self,
            DispatchError::Backend(stevedore_backend::BackendError::RunDiscoveryTimeout)
        )
    }
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
