//! 在线会话查询
//!
//! - GET /sessions

use crate::AppState;
use crate::utils::response::session_to_dto;
use api_contract::{ApiResponse, SessionDto};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub async fn list_sessions(State(state): State<AppState>) -> Response {
    let data: Vec<SessionDto> = state
        .sessions
        .sessions()
        .into_iter()
        .map(session_to_dto)
        .collect();
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}
