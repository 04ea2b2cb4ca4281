// tests/logger/negotiation_test.rs
#[path = "../common/mod.rs"]
mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{session_with, RecordingSink};
use ferry::codec::{FileLocation, TaskError, Value};
use ferry::logger::{kinds, HostSession, LoggerError, LoggerMessage, ScopedLoggerManager};
use ferry::protocol::{Direction, Envelope, ManagerList, Outbox, ProtocolError};
use ferry::terminal::{Severity, TerminalSinkManager};
use tokio::sync::mpsc::UnboundedReceiver;

/// Both endpoints wired together with a pump task per direction.
struct Connected {
    worker: Arc<ScopedLoggerManager>,
    host_errors: Arc<Mutex<Vec<String>>>,
}

fn endpoints(
    session: Option<Arc<dyn HostSession>>,
) -> (ManagerList, ManagerList, Arc<ScopedLoggerManager>) {
    let host_sinks = Arc::new(TerminalSinkManager::new());
    let host_loggers = Arc::new(ScopedLoggerManager::new(host_sinks.clone(), session));
    let mut host = ManagerList::new();
    host.register(host_sinks).unwrap();
    host.register(host_loggers).unwrap();

    let worker_sinks = Arc::new(TerminalSinkManager::new());
    let worker_loggers = Arc::new(ScopedLoggerManager::new(worker_sinks.clone(), None));
    let mut worker = ManagerList::new();
    worker.register(worker_sinks).unwrap();
    worker.register(worker_loggers.clone()).unwrap();

    (host, worker, worker_loggers)
}

fn connect(session: Option<Arc<dyn HostSession>>) -> Connected {
    let (host, worker, worker_loggers) = endpoints(session);
    let (to_host, mut host_rx) = Outbox::channel();
    let (to_worker, mut worker_rx) = Outbox::channel();
    worker.attach(&to_host);
    host.attach(&to_worker);

    let host_errors = Arc::new(Mutex::new(Vec::new()));
    let errors = host_errors.clone();
    tokio::spawn(async move {
        while let Some(envelope) = host_rx.recv().await {
            if let Err(err) = host.dispatch(Direction::FromWorker, envelope) {
                errors.lock().unwrap().push(err.to_string());
            }
        }
    });
    tokio::spawn(async move {
        while let Some(envelope) = worker_rx.recv().await {
            worker.dispatch(Direction::FromSupervisor, envelope).unwrap();
        }
    });

    Connected {
        worker: worker_loggers,
        host_errors,
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

async fn next_frame(rx: &mut UnboundedReceiver<Envelope>) -> Envelope {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_round_trip_reaches_host_logger_once() {
    let (session, loggers) = session_with(&["build"]);
    let (build, build_sink) = &loggers[0];
    let connected = connect(Some(session));

    let remote = connected.worker.request_logger("build").await.unwrap();
    assert_eq!(remote.name(), "build");
    assert!(!connected.worker.is_pending("build"));

    remote.emit_warning("deprecated option").unwrap();
    remote
        .emit_error(
            TaskError::new("type mismatch")
                .without_stack()
                .with_location(FileLocation::new("src/main.rs").at(8, Some(2))),
        )
        .unwrap();
    remote.terminal().write_line("checked 3 files");

    eventually(|| build_sink.text().contains("checked 3 files")).await;

    assert_eq!(build.warnings(), vec![Value::from("deprecated option")]);
    let errors = build.errors();
    assert_eq!(errors.len(), 1);
    let error = errors[0].as_error().unwrap();
    assert_eq!(error.to_string(), "src/main.rs:8:2 - type mismatch");
    assert!(build_sink
        .writes()
        .contains(&("[build] warning: deprecated option\n".to_string(), Severity::Warning)));
    assert!(connected.host_errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_logger_is_rejected_with_session_error() {
    let (session, _loggers) = session_with(&["build"]);
    let connected = connect(Some(session));

    let err = connected.worker.request_logger("lint").await.unwrap_err();

    match err {
        LoggerError::Rejected { name, error } => {
            assert_eq!(name, "lint");
            assert_eq!(error.message, "no plugin named \"lint\" is registered");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!connected.worker.is_pending("lint"));

    // The name is free again after the answer.
    let again = connected.worker.request_logger("lint").await.unwrap_err();
    assert!(matches!(again, LoggerError::Rejected { .. }));
}

#[tokio::test]
async fn test_without_session_every_request_is_rejected() {
    let connected = connect(None);

    let err = connected.worker.request_logger("build").await.unwrap_err();
    assert!(err.to_string().contains("no host session"));
}

#[tokio::test]
async fn test_second_request_while_pending_sends_nothing() {
    let (_host, worker, loggers) = endpoints(None);
    let (outbox, mut to_host) = Outbox::channel();
    worker.attach(&outbox);

    let first = {
        let loggers = loggers.clone();
        tokio::spawn(async move { loggers.request_logger("build").await })
    };
    let request = next_frame(&mut to_host).await;
    assert!(request.is(kinds::LOGGER_REQUEST));

    let err = loggers.request_logger("build").await.unwrap_err();
    assert_eq!(err.to_string(), "logger \"build\" already requested");
    assert!(to_host.try_recv().is_err());

    let response = Envelope::encode(&LoggerMessage::LoggerResponse {
        name: "build".to_string(),
        sink_id: Some(7),
        error: None,
    })
    .unwrap();
    worker.dispatch(Direction::FromSupervisor, response).unwrap();

    let remote = first.await.unwrap().unwrap();
    assert_eq!(remote.sink_id(), 7);
}

#[tokio::test]
async fn test_incomplete_response_is_fatal_and_drops_requester() {
    let (_host, worker, loggers) = endpoints(None);
    let (outbox, mut to_host) = Outbox::channel();
    worker.attach(&outbox);

    let pending = {
        let loggers = loggers.clone();
        tokio::spawn(async move { loggers.request_logger("build").await })
    };
    next_frame(&mut to_host).await;

    let response = Envelope::encode(&LoggerMessage::LoggerResponse {
        name: "build".to_string(),
        sink_id: None,
        error: None,
    })
    .unwrap();
    let err = worker
        .dispatch(Direction::FromSupervisor, response)
        .unwrap_err();
    assert!(matches!(err, ProtocolError::IncompleteResponse(ref name) if name == "build"));

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, LoggerError::Disconnected(_)));
}

#[tokio::test]
async fn test_unsolicited_response_is_fatal() {
    let (_host, worker, _loggers) = endpoints(None);
    let (outbox, _to_host) = Outbox::channel();
    worker.attach(&outbox);

    let response = Envelope::encode(&LoggerMessage::LoggerResponse {
        name: "build".to_string(),
        sink_id: Some(1),
        error: None,
    })
    .unwrap();
    let err = worker
        .dispatch(Direction::FromSupervisor, response)
        .unwrap_err();
    assert!(matches!(err, ProtocolError::NoPendingRequest(_)));
}

#[tokio::test]
async fn test_emit_for_unknown_logger_is_fatal() {
    let (session, _loggers) = session_with(&["build"]);
    let (host, _worker, _worker_loggers) = endpoints(Some(session));
    let (outbox, _to_worker) = Outbox::channel();
    host.attach(&outbox);

    let emit = Envelope::encode(&LoggerMessage::LoggerEmit {
        sink_id: 5,
        is_error: true,
        error: ferry::codec::SerializedValue::Null,
    })
    .unwrap();
    let err = host.dispatch(Direction::FromWorker, emit).unwrap_err();
    assert!(matches!(err, ProtocolError::UnregisteredLogger(5)));
}

#[tokio::test]
async fn test_unsupported_value_fails_before_sending() {
    let (_host, worker, loggers) = endpoints(None);
    let (outbox, mut to_host) = Outbox::channel();
    worker.attach(&outbox);

    let requester = {
        let loggers = loggers.clone();
        tokio::spawn(async move { loggers.request_logger("build").await })
    };
    next_frame(&mut to_host).await;
    let response = Envelope::encode(&LoggerMessage::LoggerResponse {
        name: "build".to_string(),
        sink_id: Some(1),
        error: None,
    })
    .unwrap();
    worker.dispatch(Direction::FromSupervisor, response).unwrap();
    let remote = requester.await.unwrap().unwrap();

    let err = remote
        .emit_error(Value::List(vec![Value::from("a")]))
        .unwrap_err();
    assert!(matches!(err, LoggerError::Codec(_)));
    assert!(to_host.try_recv().is_err());
}

#[test]
fn test_recording_sink_is_a_terminal_sink() {
    // Loggers in these tests print through the sink they were given.
    let sink = RecordingSink::new();
    let logger = ferry::logger::TerminalLogger::new("build", sink.clone());
    ferry::logger::HostLogger::emit_warning(&logger, Value::from("careful"));
    assert_eq!(sink.text(), "[build] warning: careful\n");
}
