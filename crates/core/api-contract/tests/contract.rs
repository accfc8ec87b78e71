use api_contract::{DispatchCommandRequest, DispatchReceiptDto, SessionDto};
use serde_json::Value;

#[test]
fn dispatch_request_accepts_camel_case() {
    let payload = r#"{"deviceId":7,"type":"custom","attributes":{"data":"APN,internet"}}"#;
    let req: DispatchCommandRequest = serde_json::from_str(payload).expect("parse");
    assert_eq!(req.device_id, 7);
    assert_eq!(req.kind, "custom");
    assert_eq!(req.attributes.get("data").map(String::as_str), Some("APN,internet"));
}

#[test]
fn dispatch_request_attributes_are_optional() {
    let payload = r#"{"device_id":3,"type":"engineStop"}"#;
    let req: DispatchCommandRequest = serde_json::from_str(payload).expect("parse");
    assert_eq!(req.device_id, 3);
    assert!(req.attributes.is_empty());
}

#[test]
fn dispatch_request_requires_type() {
    let payload = r#"{"deviceId":3}"#;
    assert!(serde_json::from_str::<DispatchCommandRequest>(payload).is_err());
}

#[test]
fn receipt_is_camel_case() {
    let receipt = DispatchReceiptDto {
        dispatch_id: "d-1".to_string(),
        device_id: 7,
        protocol: "mobilogix".to_string(),
        channel_id: "ch-1".to_string(),
        bytes_written: 42,
        dispatched_at_ms: 1_700_000_000_000,
    };
    let value = serde_json::to_value(receipt).expect("serialize");
    assert!(value.get("dispatchId").is_some());
    assert!(value.get("bytesWritten").is_some());
    assert!(value.get("dispatch_id").is_none());
    assert!(matches!(value.get("dispatchedAtMs"), Some(Value::Number(_))));
}

#[test]
fn session_is_camel_case() {
    let session = SessionDto {
        device_id: 1,
        unique_id: "ID123".to_string(),
        protocol: "mobilogix".to_string(),
        channel_id: "ch-3".to_string(),
        remote: "127.0.0.1:5000".to_string(),
        transport: "tcp".to_string(),
        bound_at_ms: 1,
    };
    let value = serde_json::to_value(session).expect("serialize");
    assert_eq!(value.get("uniqueId"), Some(&Value::String("ID123".to_string())));
    assert!(value.get("boundAtMs").is_some());
}
