//! In-process values that may be handed to the boundary codec.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::BTreeMap;
use std::fmt;

/// A value living on one side of the channel.
///
/// Only `Undefined`, `Null`, scalars, and errors can cross the boundary.
/// Lists and maps are valid in-process but are rejected by
/// [`serialize_value`](super::serialize_value).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Undefined,
    /// Explicit null.
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// An error carrying a message and optional stack.
    Error(TaskError),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Short name of the value's shape, used in diagnostics.
    pub fn shape(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Error(_) => "error",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Returns the contained error, if any.
    pub fn as_error(&self) -> Option<&TaskError> {
        match self {
            Value::Error(err) => Some(err),
            _ => None,
        }
    }

    pub fn into_error(self) -> Option<TaskError> {
        match self {
            Value::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Convert into an error, rendering non-error values as the message.
    pub fn into_task_error(self) -> TaskError {
        match self {
            Value::Error(err) => err,
            other => TaskError::new(other.to_string()).without_stack(),
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Error(err) => write!(f, "{}", err),
            Value::List(items) => write!(f, "[list of {}]", items.len()),
            Value::Map(entries) => write!(f, "[map of {}]", entries.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<TaskError> for Value {
    fn from(err: TaskError) -> Self {
        Value::Error(err)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Undefined)
    }
}

/// Location of a diagnostic inside a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation {
    pub file_path: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl FileLocation {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            line: None,
            column: None,
        }
    }

    pub fn at(mut self, line: u32, column: Option<u32>) -> Self {
        self.line = Some(line);
        self.column = column;
        self
    }
}

impl fmt::Display for FileLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_path)?;
        // A column without a line is meaningless, so it is dropped.
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
            if let Some(column) = self.column {
                write!(f, ":{}", column)?;
            }
        }
        Ok(())
    }
}

/// An error that can be reported across the process boundary.
///
/// Only the message, the stack text and the optional file location survive
/// serialization; the original error type and any source chain are flattened
/// into the stack text.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskError {
    pub message: String,
    pub stack: Option<String>,
    pub location: Option<FileLocation>,
}

impl TaskError {
    /// Create an error, capturing a backtrace when `RUST_BACKTRACE` enables it.
    pub fn new(message: impl Into<String>) -> Self {
        let backtrace = Backtrace::capture();
        let stack = match backtrace.status() {
            BacktraceStatus::Captured => Some(backtrace.to_string()),
            _ => None,
        };
        Self {
            message: message.into(),
            stack,
            location: None,
        }
    }

    /// Flatten any error into a `TaskError`, rendering its source chain as the stack.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(format!("Caused by: {}", cause));
            source = cause.source();
        }
        Self {
            message: err.to_string(),
            stack: if causes.is_empty() {
                None
            } else {
                Some(causes.join("\n"))
            },
            location: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn without_stack(mut self) -> Self {
        self.stack = None;
        self
    }

    pub fn with_location(mut self, location: FileLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} - {}", location, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for TaskError {}
