use api_contract::{ApiResponse, ProtocolDto};
use serde_json::Value;

#[test]
fn success_envelope_carries_data() {
    let response = ApiResponse::success(vec![ProtocolDto {
        name: "mobilogix".to_string(),
        transports: vec!["tcp".to_string()],
        commands: vec!["engineStop".to_string()],
        port: Some(5221),
    }]);
    let value = serde_json::to_value(response).expect("serialize");
    assert_eq!(value["success"], Value::Bool(true));
    assert_eq!(value["data"][0]["name"], "mobilogix");
    assert_eq!(value["error"], Value::Null);
}

#[test]
fn error_envelope_carries_code() {
    let response = ApiResponse::<()>::error("COMMAND.NO_SESSION", "no active session for device 7");
    assert!(!response.success);
    let value = serde_json::to_value(response).expect("serialize");
    assert_eq!(value["data"], Value::Null);
    assert_eq!(value["error"]["code"], "COMMAND.NO_SESSION");
}
