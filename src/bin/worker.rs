//! ferry worker - runs one task for a supervising `ferry` process.
//!
//! Usage:
//!   ferry-worker [runtime args...] <task> <inner-configuration> <task-configuration>
//!
//! Stdin and stdout carry the protocol; diagnostics go to stderr.

use std::io;
use std::process::ExitCode;

use ferry::runner;
use ferry::tasks::builtin_registry;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    runner::worker_main(builtin_registry())
}
