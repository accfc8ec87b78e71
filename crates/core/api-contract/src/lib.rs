//! 稳定的 DTO 与 API 响应契约。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 命令下发请求体。
///
/// `type` 取命令类型的 camelCase 名称（如 `engineStop`）。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchCommandRequest {
    #[serde(alias = "device_id")]
    pub device_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// 命令下发回执。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReceiptDto {
    pub dispatch_id: String,
    pub device_id: i64,
    pub protocol: String,
    pub channel_id: String,
    pub bytes_written: usize,
    pub dispatched_at_ms: i64,
}

/// 在线会话。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDto {
    pub device_id: i64,
    pub unique_id: String,
    pub protocol: String,
    pub channel_id: String,
    pub remote: String,
    pub transport: String,
    pub bound_at_ms: i64,
}

/// 已注册协议及其支持的命令。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolDto {
    pub name: String,
    pub transports: Vec<String>,
    pub commands: Vec<String>,
    pub port: Option<u16>,
}

/// 网关计数器快照。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsDto {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub frames_received: u64,
    pub framing_errors: u64,
    pub frames_malformed: u64,
    pub unknown_devices: u64,
    pub positions_decoded: u64,
    pub positions_written: u64,
    pub positions_dropped: u64,
    pub sessions_bound: u64,
    pub sessions_superseded: u64,
    pub active_sessions: usize,
    pub backpressure_closes: u64,
    pub commands_dispatched: u64,
    pub command_dispatch_success: u64,
    pub command_dispatch_failure: u64,
    pub command_dispatch_latency_ms_avg: Option<f64>,
}
