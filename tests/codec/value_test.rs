// tests/codec/value_test.rs
use std::collections::BTreeMap;

use ferry::codec::{
    deserialize_value, serialize_value, CodecError, FileLocation, SerializedValue, TaskError, Value,
};

#[test]
fn test_error_crosses_with_message_and_stack() {
    let error = TaskError::new("compile failed").with_stack("at build (main.rs:10)");

    let back = deserialize_value(&serialize_value(&Value::from(error)).unwrap());

    let back = back.into_error().unwrap();
    assert_eq!(back.message, "compile failed");
    assert_eq!(back.stack.as_deref(), Some("at build (main.rs:10)"));
    assert!(back.location.is_none());
}

#[test]
fn test_file_error_keeps_location() {
    let error = TaskError::new("unused variable")
        .without_stack()
        .with_location(FileLocation::new("src/app.rs").at(12, Some(7)));

    let wire = serialize_value(&Value::from(error.clone())).unwrap();
    assert_eq!(wire.type_name(), "file-error");
    assert!(wire.is_error());

    let back = deserialize_value(&wire).into_error().unwrap();
    assert_eq!(back, error);
    assert_eq!(back.to_string(), "src/app.rs:12:7 - unused variable");
}

#[test]
fn test_undefined_and_null_stay_distinct() {
    let undefined = serialize_value(&Value::Undefined).unwrap();
    let null = serialize_value(&Value::Null).unwrap();

    assert_eq!(undefined, SerializedValue::Undefined);
    assert_eq!(null, SerializedValue::Null);
    assert!(deserialize_value(&undefined).is_undefined());
    assert_eq!(deserialize_value(&null), Value::Null);
}

#[test]
fn test_scalars_cross_unchanged() {
    for value in [Value::from(false), Value::from(2.5), Value::from("lint")] {
        let wire = serialize_value(&value).unwrap();
        assert_eq!(wire.type_name(), "primitive");
        assert_eq!(deserialize_value(&wire), value);
    }
}

#[test]
fn test_structured_values_are_rejected() {
    let list = Value::List(vec![Value::from(1i64)]);
    let mut entries = BTreeMap::new();
    entries.insert("key".to_string(), Value::Null);
    let map = Value::Map(entries);

    let err = serialize_value(&list).unwrap_err();
    assert!(matches!(err, CodecError::Unsupported { shape: "list", .. }));
    assert_eq!(
        err.to_string(),
        "unsupported value in boundary serialization: list ([list of 1])"
    );

    let err = serialize_value(&map).unwrap_err();
    assert!(matches!(err, CodecError::Unsupported { shape: "map", .. }));
}

#[test]
fn test_primitive_exit_value_becomes_error_text() {
    let wire = serialize_value(&Value::from("build broke")).unwrap();
    let error = deserialize_value(&wire).into_task_error();

    assert_eq!(error.message, "build broke");
    assert!(error.stack.is_none());
}
