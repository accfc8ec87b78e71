//! HTTP 响应辅助函数和 DTO 转换
//!
//! 所有错误返回统一的 ApiResponse 格式，HTTP 状态码与错误码一一对应。

use api_contract::{ApiResponse, DispatchReceiptDto, SessionDto};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gateway_control::{DispatchError, DispatchReceipt};
use gateway_protocol::SessionSnapshot;

/// 错误请求响应
pub fn bad_request_error(message: impl Into<String>) -> Response {
    error_response(StatusCode::BAD_REQUEST, "INVALID.REQUEST", message)
}

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ApiResponse::<()>::error(code, message.into())),
    )
        .into_response()
}

/// 下发错误响应
pub fn dispatch_error(err: DispatchError) -> Response {
    let (status, code) = match &err {
        DispatchError::DeviceUnknown(_) => (StatusCode::NOT_FOUND, "DEVICE.NOT_FOUND"),
        DispatchError::NoActiveSession(_) => (StatusCode::CONFLICT, "COMMAND.NO_SESSION"),
        DispatchError::Unsupported { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "COMMAND.UNSUPPORTED")
        }
        DispatchError::Encode(_) => (StatusCode::BAD_REQUEST, "COMMAND.INVALID"),
        DispatchError::Transport(_) => (StatusCode::BAD_GATEWAY, "COMMAND.TRANSPORT"),
        DispatchError::Unconfirmed(_) => (StatusCode::GATEWAY_TIMEOUT, "COMMAND.UNCONFIRMED"),
        DispatchError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL.ERROR"),
    };
    error_response(status, code, err.to_string())
}

pub fn receipt_to_dto(receipt: DispatchReceipt) -> DispatchReceiptDto {
    DispatchReceiptDto {
        dispatch_id: receipt.dispatch_id,
        device_id: receipt.device_id,
        protocol: receipt.protocol,
        channel_id: receipt.channel_id.to_string(),
        bytes_written: receipt.bytes_written,
        dispatched_at_ms: receipt.dispatched_at_ms,
    }
}

pub fn session_to_dto(snapshot: SessionSnapshot) -> SessionDto {
    SessionDto {
        device_id: snapshot.device_id,
        unique_id: snapshot.unique_id,
        protocol: snapshot.protocol,
        channel_id: snapshot.channel_id.to_string(),
        remote: snapshot.remote.to_string(),
        transport: snapshot.transport.to_string(),
        bound_at_ms: snapshot.bound_at_ms,
    }
}
