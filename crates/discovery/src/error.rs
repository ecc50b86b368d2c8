//! Error types for the discovery boundary.

use catalog::CatalogId;
use thiserror::Error;

/// Errors a discovery collaborator can surface.
///
/// `Transient` is the only retryable variant; the fetch pool retries it with
/// backoff and treats everything else as final for the batch.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("catalog id {0} not found")]
    NotFound(CatalogId),

    #[error("transient provider failure: {0}")]
    Transient(String),

    #[error("provider failure: {0}")]
    Fatal(String),
}

impl DiscoveryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DiscoveryError::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
