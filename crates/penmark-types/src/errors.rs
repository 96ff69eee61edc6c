use thiserror::Error;

use crate::upload::UploadFailure;

pub type Result<T, E = PenmarkError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum PenmarkError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("controller error: {0}")]
    Controller(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error("upload failed: {0}")]
    Upload(#[from] UploadFailure),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
