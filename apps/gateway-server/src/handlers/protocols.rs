//! 已注册协议
//!
//! - GET /protocols

use crate::AppState;
use api_contract::{ApiResponse, ProtocolDto};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub async fn list_protocols(State(state): State<AppState>) -> Response {
    let data: Vec<ProtocolDto> = state
        .protocols
        .modules()
        .map(|module| ProtocolDto {
            name: module.name().to_string(),
            transports: module
                .transports()
                .iter()
                .map(|transport| transport.to_string())
                .collect(),
            commands: module
                .supported_commands()
                .iter()
                .map(|kind| kind.to_string())
                .collect(),
            port: state.ports.get(module.name()).copied(),
        })
        .collect();
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}
