//! Host-side loggers and the session that resolves them by name.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

use crate::codec::{TaskError, Value};
use crate::terminal::{Severity, TerminalSink};

/// A real logger living in the supervisor, bound to one plugin.
pub trait HostLogger: Send + Sync {
    fn name(&self) -> &str;

    /// Sink the worker's proxy for this logger writes into.
    fn terminal_sink(&self) -> Arc<dyn TerminalSink>;

    fn emit_error(&self, error: Value);

    fn emit_warning(&self, warning: Value);
}

/// The host collaborator that resolves loggers by name.
pub trait HostSession: Send + Sync {
    fn resolve_logger(&self, name: &str) -> Result<Arc<dyn HostLogger>, TaskError>;
}

/// A session backed by a fixed set of registered loggers.
#[derive(Default)]
pub struct LoggerRegistry {
    loggers: DashMap<String, Arc<dyn HostLogger>>,
}

impl LoggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a logger under its own name, replacing any previous one.
    pub fn register(&self, logger: Arc<dyn HostLogger>) {
        self.loggers.insert(logger.name().to_string(), logger);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.loggers.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loggers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl HostSession for LoggerRegistry {
    fn resolve_logger(&self, name: &str) -> Result<Arc<dyn HostLogger>, TaskError> {
        self.loggers
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                TaskError::new(format!("no plugin named \"{}\" is registered", name))
                    .without_stack()
            })
    }
}

/// A host logger that prints to a terminal sink and keeps what it was sent.
pub struct TerminalLogger {
    name: String,
    sink: Arc<dyn TerminalSink>,
    errors: Mutex<Vec<Value>>,
    warnings: Mutex<Vec<Value>>,
}

impl TerminalLogger {
    pub fn new(name: impl Into<String>, sink: Arc<dyn TerminalSink>) -> Self {
        Self {
            name: name.into(),
            sink,
            errors: Mutex::new(Vec::new()),
            warnings: Mutex::new(Vec::new()),
        }
    }

    pub fn errors(&self) -> Vec<Value> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn warnings(&self) -> Vec<Value> {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn has_errors(&self) -> bool {
        !self
            .errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    fn print(&self, label: &str, value: &Value, severity: Severity) {
        let line = format!(
            "[{}] {}: {}{}",
            self.name,
            label,
            value,
            self.sink.line_ending()
        );
        self.sink.write(&line, severity);
    }
}

impl HostLogger for TerminalLogger {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminal_sink(&self) -> Arc<dyn TerminalSink> {
        Arc::clone(&self.sink)
    }

    fn emit_error(&self, error: Value) {
        self.print("error", &error, Severity::Error);
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error);
    }

    fn emit_warning(&self, warning: Value) {
        self.print("warning", &warning, Severity::Warning);
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(warning);
    }
}
