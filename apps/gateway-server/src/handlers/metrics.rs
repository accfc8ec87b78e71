//! Telemetry 指标快照
//!
//! - GET /metrics

use crate::AppState;
use api_contract::{ApiResponse, MetricsDto};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gateway_telemetry::metrics;

pub async fn get_metrics(State(state): State<AppState>) -> Response {
    let snapshot = metrics().snapshot();
    let latency_avg = (snapshot.command_dispatch_latency_ms_count > 0).then(|| {
        snapshot.command_dispatch_latency_ms_total as f64
            / snapshot.command_dispatch_latency_ms_count as f64
    });
    (
        StatusCode::OK,
        Json(ApiResponse::success(MetricsDto {
            connections_opened: snapshot.connections_opened,
            connections_closed: snapshot.connections_closed,
            frames_received: snapshot.frames_received,
            framing_errors: snapshot.framing_errors,
            frames_malformed: snapshot.frames_malformed,
            unknown_devices: snapshot.unknown_devices,
            positions_decoded: snapshot.positions_decoded,
            positions_written: snapshot.positions_written,
            positions_dropped: snapshot.positions_dropped,
            sessions_bound: snapshot.sessions_bound,
            sessions_superseded: snapshot.sessions_superseded,
            active_sessions: state.sessions.len(),
            backpressure_closes: snapshot.backpressure_closes,
            commands_dispatched: snapshot.commands_dispatched,
            command_dispatch_success: snapshot.command_dispatch_success,
            command_dispatch_failure: snapshot.command_dispatch_failure,
            command_dispatch_latency_ms_avg: latency_avg,
        })),
    )
        .into_response()
}
