//! Backend error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("token signing failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),

    #[error("backend did not report a new run id within the poll window")]
    RunDiscoveryTimeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("backend {0} is not configured")]
    NotConfigured(stevedore_core::Backend),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;
