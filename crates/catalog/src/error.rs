//! Error types for the catalog crate.

use thiserror::Error;

/// Errors raised by ingress validation and store operations.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// An ingress payload was missing its identifier. Everything else in a
    /// candidate payload may be absent, but an id-less record cannot be
    /// stored or deduplicated.
    #[error("payload has no usable id field")]
    MissingId,

    /// A field carried a value outside its documented range.
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// A payload that should have been a JSON object was something else.
    #[error("expected a JSON object, found {found}")]
    NotAnObject { found: &'static str },

    /// Underlying JSON deserialization failure at the ingress boundary.
    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O failure while reading a library or catalog file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CatalogError>;
