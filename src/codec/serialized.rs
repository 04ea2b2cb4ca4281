//! Boundary-safe serialized values.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{CodecError, CodecResult};
use super::value::{FileLocation, TaskError, Value};

/// A value as it appears on the wire.
///
/// Anything carried by an envelope that is not a plain field (in practice,
/// errors) goes through this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SerializedValue {
    Undefined,
    Null,
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },
    FileError {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
        file_path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        column: Option<u32>,
    },
    Primitive {
        value: Primitive,
    },
}

/// Scalar payload of [`SerializedValue::Primitive`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Primitive {
    Bool(bool),
    Number(f64),
    String(String),
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Bool(b) => write!(f, "{}", b),
            Primitive::Number(n) => write!(f, "{}", n),
            Primitive::String(s) => write!(f, "{}", s),
        }
    }
}

impl SerializedValue {
    /// Serialize an error. Unlike [`serialize_value`], this cannot fail.
    pub fn from_error(error: &TaskError) -> Self {
        match &error.location {
            Some(location) => SerializedValue::FileError {
                message: error.message.clone(),
                stack: error.stack.clone(),
                file_path: location.file_path.clone(),
                line: location.line,
                column: location.column,
            },
            None => SerializedValue::Error {
                message: error.message.clone(),
                stack: error.stack.clone(),
            },
        }
    }

    /// The wire discriminator of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            SerializedValue::Undefined => "undefined",
            SerializedValue::Null => "null",
            SerializedValue::Error { .. } => "error",
            SerializedValue::FileError { .. } => "file-error",
            SerializedValue::Primitive { .. } => "primitive",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            SerializedValue::Error { .. } | SerializedValue::FileError { .. }
        )
    }
}

/// Convert a live value into its wire form.
///
/// # Errors
///
/// Returns [`CodecError::Unsupported`] for lists, maps and non-finite numbers.
pub fn serialize_value(value: &Value) -> CodecResult<SerializedValue> {
    match value {
        Value::Undefined => Ok(SerializedValue::Undefined),
        Value::Null => Ok(SerializedValue::Null),
        Value::Error(err) => Ok(SerializedValue::from_error(err)),
        Value::Bool(b) => Ok(SerializedValue::Primitive {
            value: Primitive::Bool(*b),
        }),
        // JSON has no representation for NaN or infinities.
        Value::Number(n) if n.is_finite() => Ok(SerializedValue::Primitive {
            value: Primitive::Number(*n),
        }),
        Value::String(s) => Ok(SerializedValue::Primitive {
            value: Primitive::String(s.clone()),
        }),
        other => Err(CodecError::unsupported(other)),
    }
}

/// Convert a wire value back into a live value.
pub fn deserialize_value(value: &SerializedValue) -> Value {
    match value {
        SerializedValue::Undefined => Value::Undefined,
        SerializedValue::Null => Value::Null,
        SerializedValue::Error { message, stack } => Value::Error(TaskError {
            message: message.clone(),
            stack: stack.clone(),
            location: None,
        }),
        SerializedValue::FileError {
            message,
            stack,
            file_path,
            line,
            column,
        } => Value::Error(TaskError {
            message: message.clone(),
            stack: stack.clone(),
            location: Some(FileLocation {
                file_path: file_path.clone(),
                line: *line,
                column: *column,
            }),
        }),
        SerializedValue::Primitive { value } => match value {
            Primitive::Bool(b) => Value::Bool(*b),
            Primitive::Number(n) => Value::Number(*n),
            Primitive::String(s) => Value::String(s.clone()),
        },
    }
}
