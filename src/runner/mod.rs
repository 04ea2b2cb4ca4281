//! Running tasks in a worker process.
//!
//! The supervisor spawns a worker with three launch arguments: the task
//! name, the inner configuration (root sink id and terminal capabilities),
//! and the task configuration as JSON. The worker resolves the task from its
//! [`TaskRegistry`], runs it, and reports the outcome with a single exit
//! message before terminating.
//!
//! ```text
//!   RunnerSupervisor                         worker (bootstrap)
//!   ----------------                         ------------------
//!   register root sink
//!   spawn ---- task, inner, config ------->  parse launch args
//!                                            build task
//!   route  <--- sink-write / logger-* ----   task.invoke()
//!          ---- logger-response --------->
//!   settle <--- exit {error} --------------  exit message, terminate
//! ```

mod bootstrap;
mod error;
mod launch;
mod spawner;
mod supervisor;
mod task;

pub use bootstrap::{
    main as worker_main, run_worker, run_worker_with, WorkerEndpoint, EXIT_CHANNEL_FAILURE,
    EXIT_FAILURE, EXIT_REPORTED,
};
pub use error::{BootstrapError, RunnerError, RunnerResult};
pub use launch::{
    next_debug_port, rewrite_debug_args, InnerConfiguration, LaunchArgs, WorkerLaunch,
    DEBUG_PORT_BASE,
};
pub use spawner::{InProcessSpawner, ProcessSpawner, SpawnedWorker, WorkerProcess, WorkerSpawner};
pub use supervisor::{ExitOutcome, ExitTracker, RunnerState, RunnerSupervisor};
pub use task::{RunnableTask, TaskRegistry, WorkerContext, WorkerTask};
