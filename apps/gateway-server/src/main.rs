//! 网关进程入口：协议监听 + 运维 HTTP 接口。

mod handlers;
mod routes;
mod runtime;
mod utils;

use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
};
use gateway_config::AppConfig;
use gateway_telemetry::{init_tracing, new_request_ids};
use tower_http::trace::TraceLayer;
use tracing::{Instrument, info, warn};

pub use runtime::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    let gateway = runtime::Gateway::start(&config).await?;
    let app = build_app(gateway.state.clone());

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(target: "gateway.http", addr = %config.http_addr, "http_listening");

    let shutdown = gateway.shutdown_token();
    let http_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target: "gateway.http", error = %err, "signal_listen_failed");
        }
        info!(target: "gateway.http", "shutdown_requested");
        shutdown.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
        .await?;
    gateway.wait().await;
    Ok(())
}

/// 组装路由：同时挂在 / 与 /api 下，并注入请求追踪 ID
pub fn build_app(state: AppState) -> Router {
    let api = routes::create_api_router();
    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_context))
}

async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    // 生成 request_id 与 trace_id，并注入请求扩展与日志
    let ids = new_request_ids();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(ids.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %ids.request_id,
        trace_id = %ids.trace_id,
        method = %method,
        path = %path
    );

    let mut response = next.run(req).instrument(span).await;
    response.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&ids.request_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response.headers_mut().insert(
        "x-trace-id",
        HeaderValue::from_str(&ids.trace_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response
}
