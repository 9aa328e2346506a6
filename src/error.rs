//! Error type shared by the distributions, transforms and both codecs.

use thiserror::Error;

/// Everything that can go wrong while accessing, reading or writing a prior.
#[derive(Debug, Error)]
pub enum DistError {
    /// Malformed stream line or record field.
    #[error("format error: {0}")]
    Format(String),
    /// The stream declares a `distVersion` this crate cannot read.
    #[error("unsupported distribution format version `{0}`")]
    Version(String),
    /// A structured record was written by a different variant than the one
    /// being populated.
    #[error("record type `{found}` does not match distribution type `{expected}`")]
    InterfaceMismatch { expected: String, found: String },
    /// No constructor is registered under this type tag.
    #[error("unknown type `{0}`")]
    UnknownType(String),
    #[error("parameter index {index} out of range for {num_params} parameter(s)")]
    IndexOutOfRange { index: usize, num_params: usize },
    #[error("expected {expected} parameter value(s), got {found}")]
    ParamLength { expected: usize, found: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DistError>;

impl DistError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        DistError::Format(msg.into())
    }
}
