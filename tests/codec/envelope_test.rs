// tests/codec/envelope_test.rs
use ferry::codec::{FileLocation, SerializedValue, TaskError};
use ferry::logger::LoggerMessage;
use ferry::protocol::{Envelope, LifecycleMessage, EXIT_KIND};
use ferry::terminal::{Severity, SinkMessage};
use insta::assert_snapshot;

fn line<M: serde::Serialize>(message: &M) -> String {
    serde_json::to_string(&Envelope::encode(message).unwrap()).unwrap()
}

#[test]
fn sink_write_frame() {
    let frame = line(&SinkMessage::SinkWrite {
        sink_id: 1,
        text: "hello\n".to_string(),
        severity: Severity::Warning,
    });
    assert_snapshot!(frame, @r#"{"kind":"sink-write","severity":"warning","sink_id":1,"text":"hello\n"}"#);
}

#[test]
fn logger_request_frame() {
    let frame = line(&LoggerMessage::LoggerRequest {
        name: "build".to_string(),
    });
    assert_snapshot!(frame, @r#"{"kind":"logger-request","name":"build"}"#);
}

#[test]
fn logger_response_frames() {
    let granted = line(&LoggerMessage::LoggerResponse {
        name: "build".to_string(),
        sink_id: Some(2),
        error: None,
    });
    assert_snapshot!(granted, @r#"{"kind":"logger-response","name":"build","sink_id":2}"#);

    let refused = line(&LoggerMessage::LoggerResponse {
        name: "lint".to_string(),
        sink_id: None,
        error: Some(SerializedValue::from_error(
            &TaskError::new("unknown plugin").without_stack(),
        )),
    });
    assert_snapshot!(refused, @r#"{"kind":"logger-response","error":{"message":"unknown plugin","type":"error"},"name":"lint"}"#);
}

#[test]
fn logger_emit_file_error_frame() {
    let warning = TaskError::new("unused import")
        .without_stack()
        .with_location(FileLocation::new("src/lib.rs").at(3, None));
    let frame = line(&LoggerMessage::LoggerEmit {
        sink_id: 2,
        is_error: false,
        error: SerializedValue::from_error(&warning),
    });
    assert_snapshot!(frame, @r#"{"kind":"logger-emit","error":{"file_path":"src/lib.rs","line":3,"message":"unused import","type":"file-error"},"is_error":false,"sink_id":2}"#);
}

#[test]
fn exit_frames() {
    let success = line(&LifecycleMessage::Exit {
        error: SerializedValue::Undefined,
        protocol_violation: false,
    });
    assert_snapshot!(success, @r#"{"kind":"exit","error":{"type":"undefined"}}"#);

    let failure = line(&LifecycleMessage::Exit {
        error: SerializedValue::from_error(&TaskError::new("boom").without_stack()),
        protocol_violation: false,
    });
    assert_snapshot!(failure, @r#"{"kind":"exit","error":{"message":"boom","type":"error"}}"#);

    let aborted = line(&LifecycleMessage::Exit {
        error: SerializedValue::from_error(&TaskError::new("bad frame").without_stack()),
        protocol_violation: true,
    });
    assert_snapshot!(aborted, @r#"{"kind":"exit","error":{"message":"bad frame","type":"error"},"protocol_violation":true}"#);
}

#[test]
fn test_frame_parses_back_to_typed_message() {
    let envelope: Envelope =
        serde_json::from_str(r#"{"kind":"exit","error":{"type":"null"}}"#).unwrap();

    assert!(envelope.is(EXIT_KIND));
    let LifecycleMessage::Exit {
        error,
        protocol_violation,
    } = envelope.decode().unwrap();
    assert_eq!(error, SerializedValue::Null);
    assert!(!protocol_violation);
}

#[test]
fn test_unknown_fields_are_carried() {
    let envelope: Envelope =
        serde_json::from_str(r#"{"kind":"custom-ping","seq":4,"note":"x"}"#).unwrap();

    assert_eq!(envelope.kind(), "custom-ping");
    assert_eq!(envelope.body()["seq"], 4);
    assert_eq!(envelope.body().len(), 2);
}
