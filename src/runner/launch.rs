//! Worker launch arguments and debugger port allocation.

use std::sync::atomic::{AtomicU16, Ordering};

use serde::{Deserialize, Serialize};

use super::error::{BootstrapError, RunnerError, RunnerResult};
use crate::terminal::SinkCapabilities;

/// First port handed to a worker started under a debugger; the supervisor's
/// own debugger conventionally uses the port just below.
pub const DEBUG_PORT_BASE: u16 = 9230;

static NEXT_DEBUG_PORT: AtomicU16 = AtomicU16::new(DEBUG_PORT_BASE);

/// Allocate a debugger port no other worker in this process has been given.
///
/// # Errors
///
/// Returns [`RunnerError::DebugPortsExhausted`] once the port range above
/// [`DEBUG_PORT_BASE`] is used up.
pub fn next_debug_port() -> RunnerResult<u16> {
    allocate_port(&NEXT_DEBUG_PORT)
}

fn allocate_port(counter: &AtomicU16) -> RunnerResult<u16> {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |port| port.checked_add(1))
        .map_err(|_| RunnerError::DebugPortsExhausted)
}

/// Configuration the runner itself needs inside the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerConfiguration {
    pub root_sink_id: u32,
    pub supports_color: bool,
    pub line_ending: String,
}

impl InnerConfiguration {
    pub fn new(root_sink_id: u32, capabilities: SinkCapabilities) -> Self {
        Self {
            root_sink_id,
            supports_color: capabilities.supports_color,
            line_ending: capabilities.line_ending,
        }
    }

    pub fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities {
            supports_color: self.supports_color,
            line_ending: self.line_ending.clone(),
        }
    }
}

/// Everything a spawner needs to start one worker.
#[derive(Debug, Clone)]
pub struct WorkerLaunch {
    /// Registered name of the task to run.
    pub task: String,
    pub inner: InnerConfiguration,
    /// Task configuration; plain JSON data only.
    pub config: serde_json::Value,
    /// Arguments placed before the positional launch arguments.
    pub runtime_args: Vec<String>,
}

impl WorkerLaunch {
    /// Render as `[runtime args..., task, inner json, config json]`.
    pub fn to_args(&self) -> RunnerResult<Vec<String>> {
        let mut args = self.runtime_args.clone();
        args.push(self.task.clone());
        args.push(serde_json::to_string(&self.inner).map_err(RunnerError::InvalidConfiguration)?);
        args.push(serde_json::to_string(&self.config).map_err(RunnerError::InvalidConfiguration)?);
        Ok(args)
    }
}

/// Launch arguments as parsed by the worker.
#[derive(Debug, Clone)]
pub struct LaunchArgs {
    pub runtime_args: Vec<String>,
    pub task: String,
    pub inner: InnerConfiguration,
    pub config: serde_json::Value,
}

impl LaunchArgs {
    /// Parse the argument vector (without the program name).
    ///
    /// The last three arguments are positional; anything before them is a
    /// runtime argument.
    pub fn parse(args: &[String]) -> Result<Self, BootstrapError> {
        let [runtime @ .., task, inner, config] = args else {
            return Err(BootstrapError::MissingArguments(args.len()));
        };
        let inner: InnerConfiguration =
            serde_json::from_str(inner).map_err(BootstrapError::InvalidInnerConfiguration)?;
        let config = serde_json::from_str(config).map_err(|source| {
            BootstrapError::InvalidTaskConfiguration {
                task: task.clone(),
                source,
            }
        })?;
        Ok(Self {
            runtime_args: runtime.to_vec(),
            task: task.clone(),
            inner,
            config,
        })
    }
}

/// Rewrite debugger-attach flags so the worker listens on its own port.
///
/// A flag matches as `--flag` or `--flag=<port>`. When any argument matches,
/// one fresh port is allocated and every match is rewritten to use it.
/// Returns the rewritten arguments and the allocated port, if any.
pub fn rewrite_debug_args(
    args: &[String],
    flags: &[String],
) -> RunnerResult<(Vec<String>, Option<u16>)> {
    let flag_of = |arg: &str| -> Option<String> {
        let name = arg.split('=').next().unwrap_or(arg);
        flags.iter().find(|f| f.as_str() == name).cloned()
    };

    if !args.iter().any(|arg| flag_of(arg).is_some()) {
        return Ok((args.to_vec(), None));
    }

    let port = next_debug_port()?;
    let rewritten = args
        .iter()
        .map(|arg| match flag_of(arg) {
            Some(flag) => format!("{}={}", flag, port),
            None => arg.clone(),
        })
        .collect();
    Ok((rewritten, Some(port)))
}
