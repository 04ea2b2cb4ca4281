//! Tasks shipped with the `ferry-worker` binary.
//!
//! | name          | does                                                  |
//! |---------------|-------------------------------------------------------|
//! | `echo`        | writes lines to the root terminal                     |
//! | `diagnostics` | requests a logger and reports warnings and errors     |
//! | `fail`        | fails with an error, optionally tied to a file        |
//! | `panic`       | panics inside the task body                           |
//! | `crash`       | terminates the process without reporting              |

use async_trait::async_trait;
use serde::Deserialize;

use crate::codec::{FileLocation, TaskError};
use crate::runner::{TaskRegistry, WorkerContext, WorkerTask};
use crate::terminal::Severity;

/// A registry with every built-in task.
pub fn builtin_registry() -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    registry
        .register::<Echo>("echo")
        .register::<Diagnostics>("diagnostics")
        .register::<Fail>("fail")
        .register::<Panic>("panic")
        .register::<Crash>("crash");
    registry
}

/// A message with an optional source position.
#[derive(Debug, Clone, Deserialize)]
pub struct Located {
    pub message: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub column: Option<u32>,
}

impl Located {
    fn to_task_error(&self) -> TaskError {
        let error = TaskError::new(self.message.clone()).without_stack();
        match &self.file {
            Some(file) => {
                let location = FileLocation::new(file.clone());
                let location = match self.line {
                    Some(line) => location.at(line, self.column),
                    None => location,
                };
                error.with_location(location)
            }
            None => error,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EchoConfig {
    pub lines: Vec<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
}

pub struct Echo {
    context: WorkerContext,
    config: EchoConfig,
}

#[async_trait]
impl WorkerTask for Echo {
    type Config = EchoConfig;

    fn create(context: WorkerContext, config: EchoConfig) -> Result<Self, TaskError> {
        Ok(Self { context, config })
    }

    async fn invoke(&mut self) -> Result<(), TaskError> {
        let severity = self.config.severity.unwrap_or(Severity::Log);
        let ending = self.context.capabilities().line_ending;
        for line in &self.config.lines {
            self.context
                .terminal()
                .write(&format!("{}{}", line, ending), severity);
        }
        Ok(())
    }
}

fn default_logger() -> String {
    "build".to_string()
}

#[derive(Debug, Deserialize)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_logger")]
    pub logger: String,
    #[serde(default)]
    pub warnings: Vec<Located>,
    #[serde(default)]
    pub errors: Vec<Located>,
}

/// Reports diagnostics through a named logger. Succeeds even when it
/// reports errors; the logger is where they are counted.
pub struct Diagnostics {
    context: WorkerContext,
    config: DiagnosticsConfig,
}

#[async_trait]
impl WorkerTask for Diagnostics {
    type Config = DiagnosticsConfig;

    fn create(context: WorkerContext, config: DiagnosticsConfig) -> Result<Self, TaskError> {
        Ok(Self { context, config })
    }

    async fn invoke(&mut self) -> Result<(), TaskError> {
        let logger = self
            .context
            .request_logger(&self.config.logger)
            .await
            .map_err(|err| TaskError::from_error(&err))?;

        for warning in &self.config.warnings {
            logger
                .emit_warning(warning.to_task_error())
                .map_err(|err| TaskError::from_error(&err))?;
        }
        for error in &self.config.errors {
            logger
                .emit_error(error.to_task_error())
                .map_err(|err| TaskError::from_error(&err))?;
        }

        logger.terminal().write_verbose_line(&format!(
            "reported {} warning(s) and {} error(s)",
            self.config.warnings.len(),
            self.config.errors.len()
        ));
        Ok(())
    }
}

/// Fails with the configured error.
pub struct Fail {
    error: Located,
}

#[async_trait]
impl WorkerTask for Fail {
    type Config = Located;

    fn create(_context: WorkerContext, config: Located) -> Result<Self, TaskError> {
        Ok(Self { error: config })
    }

    async fn invoke(&mut self) -> Result<(), TaskError> {
        Err(self.error.to_task_error())
    }
}

#[derive(Debug, Deserialize)]
pub struct PanicConfig {
    pub message: String,
}

pub struct Panic {
    message: String,
}

#[async_trait]
impl WorkerTask for Panic {
    type Config = PanicConfig;

    fn create(_context: WorkerContext, config: PanicConfig) -> Result<Self, TaskError> {
        Ok(Self {
            message: config.message,
        })
    }

    async fn invoke(&mut self) -> Result<(), TaskError> {
        panic!("{}", self.message)
    }
}

#[derive(Debug, Deserialize)]
pub struct CrashConfig {
    #[serde(default = "default_crash_code")]
    pub code: i32,
}

fn default_crash_code() -> i32 {
    3
}

/// Exits the whole process without an exit message. Only meaningful in a
/// child process.
pub struct Crash {
    code: i32,
}

#[async_trait]
impl WorkerTask for Crash {
    type Config = CrashConfig;

    fn create(_context: WorkerContext, config: CrashConfig) -> Result<Self, TaskError> {
        Ok(Self { code: config.code })
    }

    async fn invoke(&mut self) -> Result<(), TaskError> {
        tracing::warn!(code = self.code, "terminating worker without reporting");
        std::process::exit(self.code)
    }
}
