//! 路由定义
//!
//! - 健康检查：/health
//! - 会话查询：/sessions
//! - 命令下发：/commands
//! - 指标快照：/metrics
//! - 协议列表：/protocols

use super::AppState;
use super::handlers::*;
use axum::{
    Router,
    routing::{get, post},
};

/// 创建 API 路由（调用方同时挂在 / 与 /api 下）
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", get(list_sessions))
        .route("/commands", post(dispatch_command))
        .route("/metrics", get(get_metrics))
        .route("/protocols", get(list_protocols))
}

#[cfg(test)]
mod tests {
    use crate::{AppState, build_app};
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use domain::Device;
    use gateway_control::{CommandService, DispatcherConfig, SessionDispatcher};
    use gateway_protocol::{
        DeviceSession, MemoryChannel, MobilogixProtocol, ProtocolRegistry, SessionRegistry,
        TransportKind,
    };
    use gateway_storage::InMemoryDeviceDirectory;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::collections::BTreeMap;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        let directory = InMemoryDeviceDirectory::new();
        directory
            .insert(Device::new(7, "201951132031", "truck-7"))
            .expect("seed");
        let sessions = Arc::new(SessionRegistry::new());
        let dispatcher = SessionDispatcher::new(
            Arc::new(directory),
            Arc::clone(&sessions),
            DispatcherConfig::default(),
        );
        let mut ports = BTreeMap::new();
        ports.insert("mobilogix".to_string(), 5000);
        AppState {
            sessions,
            commands: Arc::new(CommandService::new(Arc::new(dispatcher))),
            protocols: Arc::new(ProtocolRegistry::with_builtin()),
            ports: Arc::new(ports),
        }
    }

    fn bind_device(state: &AppState) -> MemoryChannel {
        let (channel, memory) = MemoryChannel::open(
            SocketAddr::from(([127, 0, 0, 1], 40_001)),
            TransportKind::Tcp,
            4,
        );
        state.sessions.bind(
            DeviceSession {
                device_id: 7,
                unique_id: "201951132031".to_string(),
                protocol: "mobilogix".to_string(),
            },
            channel,
            Arc::new(MobilogixProtocol::new()),
        );
        memory
    }

    async fn send(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = build_app(state).oneshot(request).await.expect("response");
        let status = response.status();
        assert!(response.headers().contains_key("x-request-id"));
        let body = response.into_body().collect().await.expect("body").to_bytes();
        (status, serde_json::from_slice(&body).expect("json"))
    }

    fn post_command(body: &str) -> Request<Body> {
        Request::post("/api/commands")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn health_is_served_on_both_prefixes() {
        for path in ["/health", "/api/health"] {
            let request = Request::get(path).body(Body::empty()).expect("request");
            let (status, body) = send(state(), request).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["ok"], Value::Bool(true));
        }
    }

    #[tokio::test]
    async fn command_without_session_is_conflict() {
        let (status, body) = send(state(), post_command(r#"{"deviceId":7,"type":"engineStop"}"#)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "COMMAND.NO_SESSION");
    }

    #[tokio::test]
    async fn unknown_command_type_is_bad_request() {
        let (status, body) = send(state(), post_command(r#"{"deviceId":7,"type":"selfDestruct"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], Value::Bool(false));
    }

    #[tokio::test]
    async fn unknown_device_is_not_found() {
        let (status, body) = send(state(), post_command(r#"{"deviceId":99,"type":"engineStop"}"#)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "DEVICE.NOT_FOUND");
    }

    #[tokio::test]
    async fn command_is_written_to_bound_channel() {
        let state = state();
        let mut memory = bind_device(&state);
        let reader = tokio::spawn(async move { memory.recv().await });

        let (status, body) = send(state.clone(), post_command(r#"{"deviceId":7,"type":"engineStop"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["protocol"], "mobilogix");
        assert_eq!(body["data"]["deviceId"], 7);

        let written = reader.await.expect("reader").expect("frame");
        let text = String::from_utf8(written.to_vec()).expect("utf8");
        assert!(text.ends_with(",S41,201951132031,1]"));
    }

    #[tokio::test]
    async fn unsupported_command_is_unprocessable() {
        let state = state();
        let _memory = bind_device(&state);
        let (status, body) = send(state, post_command(r#"{"deviceId":7,"type":"alarmArm"}"#)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "COMMAND.UNSUPPORTED");
    }

    #[tokio::test]
    async fn sessions_and_protocols_are_listed() {
        let state = state();
        let _memory = bind_device(&state);

        let request = Request::get("/sessions").body(Body::empty()).expect("request");
        let (status, body) = send(state.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["uniqueId"], "201951132031");
        assert_eq!(body["data"][0]["transport"], "tcp");

        let request = Request::get("/protocols").body(Body::empty()).expect("request");
        let (status, body) = send(state, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["name"], "mobilogix");
        assert_eq!(body["data"][0]["port"], 5000);
        let commands = body["data"][0]["commands"].as_array().expect("commands");
        assert!(commands.iter().any(|kind| kind == "engineStop"));
    }

    #[tokio::test]
    async fn metrics_snapshot_is_served() {
        let request = Request::get("/api/metrics").body(Body::empty()).expect("request");
        let (status, body) = send(state(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["activeSessions"], 0);
        assert!(body["data"]["framesReceived"].is_number());
    }
}
