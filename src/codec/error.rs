//! Codec error types.

use thiserror::Error;

use super::value::Value;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while converting values for the boundary.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The value has a shape that cannot cross the boundary.
    #[error("unsupported value in boundary serialization: {shape} ({rendered})")]
    Unsupported {
        /// Shape of the rejected value (e.g. "map").
        shape: &'static str,
        /// Short rendering of the rejected value.
        rendered: String,
    },
}

impl CodecError {
    pub(crate) fn unsupported(value: &Value) -> Self {
        Self::Unsupported {
            shape: value.shape(),
            rendered: value.to_string(),
        }
    }
}
