//! 命令下发
//!
//! - POST /commands

use crate::AppState;
use crate::utils::response::{bad_request_error, dispatch_error, receipt_to_dto};
use api_contract::{ApiResponse, DispatchCommandRequest};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::{Command, CommandType};

pub async fn dispatch_command(
    State(state): State<AppState>,
    Json(req): Json<DispatchCommandRequest>,
) -> Response {
    let kind = match req.kind.parse::<CommandType>() {
        Ok(kind) => kind,
        Err(_) => return bad_request_error(format!("unknown command type: {}", req.kind)),
    };
    let command = req
        .attributes
        .into_iter()
        .fold(Command::new(req.device_id, kind), |command, (key, value)| {
            command.with(key, value)
        });

    match state.commands.issue_command(command).await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(ApiResponse::success(receipt_to_dto(receipt))),
        )
            .into_response(),
        Err(err) => dispatch_error(err),
    }
}
