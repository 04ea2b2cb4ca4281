//! ferry CLI - run a task in a worker process
//!
//! Usage:
//!   ferry run <task> [--config <json>] [--worker <path>] [--logger <name>]... [--verbose]
//!
//! Examples:
//!   ferry run echo --config '{"lines": ["hello"]}'
//!   ferry run diagnostics --logger build --config '{"errors": [{"message": "boom"}]}'
//!   ferry run fail --worker ./target/debug/ferry-worker --config '{"message": "nope"}'

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ferry::config::Settings;
use ferry::logger::{HostSession, LoggerRegistry, TerminalLogger};
use ferry::runner::{RunnerError, RunnerSupervisor};
use ferry::terminal::{StdioSink, TerminalSink};
use tracing_subscriber::EnvFilter;

/// Exit status when the task failed or reported errors.
const EXIT_TASK_FAILED: u8 = 1;

/// Exit status when the worker could not run the task to completion.
const EXIT_RUNNER_FAILED: u8 = 2;

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "ferry - run tasks in an isolated worker process")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task in a new worker
    Run {
        /// Name of the task registered in the worker
        task: String,

        /// Task configuration as JSON
        #[arg(short, long, default_value = "{}")]
        config: String,

        /// Path to the worker binary (overrides worker.path)
        #[arg(short, long)]
        worker: Option<PathBuf>,

        /// Logger the worker may request (repeatable)
        #[arg(short, long = "logger")]
        loggers: Vec<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            task,
            config,
            worker,
            loggers,
            verbose,
        } => cmd_run(task, config, worker, loggers, verbose).await,
    }
}

async fn cmd_run(
    task: String,
    config: String,
    worker: Option<PathBuf>,
    loggers: Vec<String>,
    verbose: bool,
) -> ExitCode {
    let mut settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            return ExitCode::from(EXIT_RUNNER_FAILED);
        }
    };
    if let Some(worker) = worker {
        settings.worker.path = Some(worker.display().to_string());
    }
    settings.terminal.verbose |= verbose;
    settings.session.loggers.extend(loggers);

    let config: serde_json::Value = match serde_json::from_str(&config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid task configuration: {}", e);
            return ExitCode::from(EXIT_RUNNER_FAILED);
        }
    };

    let sink: Arc<dyn TerminalSink> = Arc::new(
        StdioSink::new()
            .with_verbose(settings.terminal.verbose)
            .with_debug(settings.terminal.debug),
    );

    let registry = LoggerRegistry::new();
    let mut host_loggers = Vec::new();
    for name in &settings.session.loggers {
        if registry.contains(name) {
            continue;
        }
        let logger = Arc::new(TerminalLogger::new(name.clone(), Arc::clone(&sink)));
        registry.register(logger.clone());
        host_loggers.push(logger);
    }
    let session: Arc<dyn HostSession> = Arc::new(registry);

    let mut runner = match RunnerSupervisor::from_settings(&settings, sink, Some(session)) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_RUNNER_FAILED);
        }
    };

    match runner.launch(&task, &config).await {
        Ok(()) => {
            let errors: usize = host_loggers.iter().map(|l| l.errors().len()).sum();
            if errors > 0 {
                eprintln!("Task \"{}\" reported {} error(s)", task, errors);
                return ExitCode::from(EXIT_TASK_FAILED);
            }
            ExitCode::SUCCESS
        }
        Err(RunnerError::Task(e)) => {
            eprintln!("Task \"{}\" failed: {}", task, e);
            if let Some(stack) = &e.stack {
                eprintln!("{}", stack);
            }
            ExitCode::from(EXIT_TASK_FAILED)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_RUNNER_FAILED)
        }
    }
}
