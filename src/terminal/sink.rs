//! Terminal sinks and the line-oriented `Terminal` wrapper.

use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Severity of a terminal write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Log,
    Warning,
    Error,
    Verbose,
    Debug,
}

/// Capability flags of a sink, forwarded to the worker at launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkCapabilities {
    pub supports_color: bool,
    pub line_ending: String,
}

impl Default for SinkCapabilities {
    fn default() -> Self {
        Self {
            supports_color: false,
            line_ending: "\n".to_string(),
        }
    }
}

/// A log destination.
pub trait TerminalSink: Send + Sync {
    fn supports_color(&self) -> bool;

    fn line_ending(&self) -> &str;

    fn write(&self, text: &str, severity: Severity);

    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities {
            supports_color: self.supports_color(),
            line_ending: self.line_ending().to_string(),
        }
    }
}

/// Writes log output to stdout and warnings/errors to stderr.
#[derive(Debug, Clone)]
pub struct StdioSink {
    supports_color: bool,
    verbose: bool,
    debug: bool,
}

impl StdioSink {
    pub fn new() -> Self {
        Self {
            supports_color: io::stdout().is_terminal(),
            verbose: false,
            debug: false,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    fn enabled(&self, severity: Severity) -> bool {
        match severity {
            Severity::Verbose => self.verbose,
            Severity::Debug => self.debug,
            _ => true,
        }
    }
}

impl Default for StdioSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalSink for StdioSink {
    fn supports_color(&self) -> bool {
        self.supports_color
    }

    fn line_ending(&self) -> &str {
        "\n"
    }

    fn write(&self, text: &str, severity: Severity) {
        if !self.enabled(severity) {
            return;
        }
        // Terminal output is best-effort; a closed pipe must not fail the build.
        let _ = match severity {
            Severity::Warning | Severity::Error => io::stderr().lock().write_all(text.as_bytes()),
            _ => io::stdout().lock().write_all(text.as_bytes()),
        };
    }
}

/// Line-oriented convenience wrapper over a sink.
#[derive(Clone)]
pub struct Terminal {
    sink: Arc<dyn TerminalSink>,
}

impl Terminal {
    pub fn new(sink: Arc<dyn TerminalSink>) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &Arc<dyn TerminalSink> {
        &self.sink
    }

    pub fn write(&self, text: &str, severity: Severity) {
        self.sink.write(text, severity);
    }

    pub fn write_line(&self, text: &str) {
        self.line(text, Severity::Log);
    }

    pub fn write_warning_line(&self, text: &str) {
        self.line(text, Severity::Warning);
    }

    pub fn write_error_line(&self, text: &str) {
        self.line(text, Severity::Error);
    }

    pub fn write_verbose_line(&self, text: &str) {
        self.line(text, Severity::Verbose);
    }

    pub fn write_debug_line(&self, text: &str) {
        self.line(text, Severity::Debug);
    }

    fn line(&self, text: &str, severity: Severity) {
        let line = format!("{}{}", text, self.sink.line_ending());
        self.sink.write(&line, severity);
    }
}

impl std::fmt::Debug for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminal")
            .field("capabilities", &self.sink.capabilities())
            .finish()
    }
}
