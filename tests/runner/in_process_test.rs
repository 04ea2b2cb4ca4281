// tests/runner/in_process_test.rs
#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::{session_with, RecordingSink};
use ferry::codec::{TaskError, Value};
use ferry::logger::HostSession;
use ferry::runner::{
    ExitOutcome, InProcessSpawner, RunnerError, RunnerState, RunnerSupervisor, TaskRegistry,
    WorkerContext, WorkerTask,
};
use ferry::tasks::builtin_registry;
use ferry::terminal::Severity;
use serde::Deserialize;
use serde_json::json;

fn supervisor(
    registry: TaskRegistry,
    session: Option<Arc<dyn HostSession>>,
) -> (RunnerSupervisor, Arc<RecordingSink>) {
    let root = RecordingSink::new();
    let spawner = Arc::new(InProcessSpawner::new(Arc::new(registry)));
    (RunnerSupervisor::new(spawner, root.clone(), session), root)
}

#[tokio::test]
async fn test_echo_output_reaches_root_sink() {
    let (mut runner, root) = supervisor(builtin_registry(), None);

    runner
        .launch(
            "echo",
            &json!({"lines": ["starting", "done"], "severity": "verbose"}),
        )
        .await
        .unwrap();

    assert_eq!(
        root.writes(),
        vec![
            ("starting\n".to_string(), Severity::Verbose),
            ("done\n".to_string(), Severity::Verbose),
        ]
    );
    assert_eq!(runner.state(), RunnerState::Exited(ExitOutcome::Succeeded));
}

#[tokio::test]
async fn test_diagnostics_reach_named_logger() {
    let (session, loggers) = session_with(&["build", "lint"]);
    let (build, build_sink) = &loggers[0];
    let (lint, _) = &loggers[1];
    let (mut runner, root) = supervisor(builtin_registry(), Some(session));

    runner
        .launch(
            "diagnostics",
            &json!({
                "logger": "build",
                "warnings": [{"message": "slow build"}],
                "errors": [{"message": "unresolved import", "file": "src/lib.rs", "line": 2, "column": 5}],
            }),
        )
        .await
        .unwrap();

    assert_eq!(build.warnings(), vec![Value::from("slow build")]);
    let errors = build.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].as_error().unwrap().to_string(),
        "src/lib.rs:2:5 - unresolved import"
    );
    assert!(lint.errors().is_empty() && lint.warnings().is_empty());
    assert!(build_sink
        .writes()
        .contains(&("reported 1 warning(s) and 1 error(s)\n".to_string(), Severity::Verbose)));
    assert!(root.writes().is_empty());
}

#[tokio::test]
async fn test_unknown_logger_fails_the_task() {
    let (session, _loggers) = session_with(&["build"]);
    let (mut runner, _root) = supervisor(builtin_registry(), Some(session));

    let err = runner
        .launch("diagnostics", &json!({"logger": "lint"}))
        .await
        .unwrap_err();

    assert!(err.is_task_failure());
    assert_eq!(
        err.to_string(),
        "logger \"lint\" could not be resolved: no plugin named \"lint\" is registered"
    );
}

#[tokio::test]
async fn test_failing_task_reports_its_error() {
    let (mut runner, _root) = supervisor(builtin_registry(), None);

    let err = runner
        .launch(
            "fail",
            &json!({"message": "tests failed", "file": "tests/a.rs", "line": 40}),
        )
        .await
        .unwrap_err();

    let task_error = err.task_error().unwrap();
    assert_eq!(task_error.message, "tests failed");
    assert_eq!(task_error.to_string(), "tests/a.rs:40 - tests failed");
    assert_eq!(runner.state(), RunnerState::Exited(ExitOutcome::TaskFailed));
}

#[tokio::test]
async fn test_panicking_task_is_a_task_failure() {
    let (mut runner, _root) = supervisor(builtin_registry(), None);

    let err = runner
        .launch("panic", &json!({"message": "index out of bounds"}))
        .await
        .unwrap_err();

    assert!(err.is_task_failure());
    assert_eq!(err.to_string(), "task panicked: index out of bounds");
}

#[tokio::test]
async fn test_unknown_task_is_reported_through_exit() {
    let (mut runner, _root) = supervisor(builtin_registry(), None);

    let err = runner.launch("deploy", &json!({})).await.unwrap_err();

    assert!(err.is_task_failure());
    assert_eq!(err.to_string(), "\"deploy\" is not registered as a worker task");
}

#[tokio::test]
async fn test_invalid_task_configuration_is_reported() {
    let (mut runner, _root) = supervisor(builtin_registry(), None);

    let err = runner
        .launch("echo", &json!({"lines": "not a list"}))
        .await
        .unwrap_err();

    assert!(err
        .to_string()
        .starts_with("invalid configuration for task \"echo\""));
}

#[derive(Deserialize)]
struct PairConfig {
    logger: String,
}

/// Requests the same logger twice at once.
struct RequestTwice {
    context: WorkerContext,
    logger: String,
}

#[async_trait]
impl WorkerTask for RequestTwice {
    type Config = PairConfig;

    fn create(context: WorkerContext, config: PairConfig) -> Result<Self, TaskError> {
        Ok(Self {
            context,
            logger: config.logger,
        })
    }

    async fn invoke(&mut self) -> Result<(), TaskError> {
        let (first, second) = futures::join!(
            self.context.request_logger(&self.logger),
            self.context.request_logger(&self.logger)
        );
        let first = first.map_err(|e| TaskError::from_error(&e))?;
        let second = second
            .err()
            .ok_or_else(|| TaskError::new("second request unexpectedly succeeded"))?;
        first
            .emit_warning(second.to_string())
            .map_err(|e| TaskError::from_error(&e))?;
        Ok(())
    }
}

#[tokio::test]
async fn test_concurrent_requests_for_one_name() {
    let mut registry = TaskRegistry::new();
    registry.register::<RequestTwice>("request-twice");
    let (session, loggers) = session_with(&["build"]);
    let (build, _) = &loggers[0];
    let (mut runner, _root) = supervisor(registry, Some(session));

    runner
        .launch("request-twice", &json!({"logger": "build"}))
        .await
        .unwrap();

    assert_eq!(
        build.warnings(),
        vec![Value::from("logger \"build\" already requested")]
    );
}

#[tokio::test]
async fn test_without_session_logger_requests_fail() {
    let (mut runner, _root) = supervisor(builtin_registry(), None);

    let err = runner
        .launch("diagnostics", &json!({}))
        .await
        .unwrap_err();

    match err {
        RunnerError::Task(error) => assert!(error.message.contains("no host session")),
        other => panic!("unexpected error: {other}"),
    }
}

/// Writes a warning, then reports one error through the "build" logger.
struct WarnThenReport {
    context: WorkerContext,
}

#[async_trait]
impl WorkerTask for WarnThenReport {
    type Config = ();

    fn create(context: WorkerContext, _config: ()) -> Result<Self, TaskError> {
        Ok(Self { context })
    }

    async fn invoke(&mut self) -> Result<(), TaskError> {
        self.context
            .terminal()
            .write("tsconfig.json is outdated\n", Severity::Warning);
        let build = self
            .context
            .request_logger("build")
            .await
            .map_err(|e| TaskError::from_error(&e))?;
        build
            .emit_error(TaskError::new("cannot find module 'fs'").without_stack())
            .map_err(|e| TaskError::from_error(&e))?;
        Ok(())
    }
}

#[tokio::test]
async fn test_warning_and_build_logger_error_in_one_run() {
    let mut registry = TaskRegistry::new();
    registry.register::<WarnThenReport>("warn-then-report");
    let (session, loggers) = session_with(&["build"]);
    let (build, _) = &loggers[0];
    let (mut runner, root) = supervisor(registry, Some(session));

    runner.launch("warn-then-report", &()).await.unwrap();

    assert_eq!(
        root.writes(),
        vec![("tsconfig.json is outdated\n".to_string(), Severity::Warning)]
    );
    let errors = build.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].as_error().unwrap().message, "cannot find module 'fs'");
    assert!(build.warnings().is_empty());
    assert_eq!(runner.state(), RunnerState::Exited(ExitOutcome::Succeeded));
}

/// Gives up on a logger request after one poll, then carries on.
struct AbandonRequest {
    context: WorkerContext,
}

#[async_trait]
impl WorkerTask for AbandonRequest {
    type Config = ();

    fn create(context: WorkerContext, _config: ()) -> Result<Self, TaskError> {
        Ok(Self { context })
    }

    async fn invoke(&mut self) -> Result<(), TaskError> {
        use futures::FutureExt;

        let first = self.context.request_logger("build").now_or_never();
        if first.is_some() {
            return Err(TaskError::new("request settled without a response"));
        }
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        self.context.terminal().write_line("carried on");

        let build = self
            .context
            .request_logger("build")
            .await
            .map_err(|e| TaskError::from_error(&e))?;
        build
            .emit_warning("second request answered")
            .map_err(|e| TaskError::from_error(&e))?;
        Ok(())
    }
}

#[tokio::test]
async fn test_abandoned_logger_request_does_not_end_the_run() {
    let mut registry = TaskRegistry::new();
    registry.register::<AbandonRequest>("abandon-request");
    let (session, loggers) = session_with(&["build"]);
    let (build, _) = &loggers[0];
    let (mut runner, root) = supervisor(registry, Some(session));

    runner.launch("abandon-request", &()).await.unwrap();

    assert_eq!(root.text(), "carried on\n");
    assert_eq!(build.warnings(), vec![Value::from("second request answered")]);
}
