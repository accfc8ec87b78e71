//! 追踪、请求 ID 与进程级计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub frames_received: u64,
    pub framing_errors: u64,
    pub frames_malformed: u64,
    pub unknown_devices: u64,
    pub positions_decoded: u64,
    pub sessions_bound: u64,
    pub sessions_superseded: u64,
    pub backpressure_closes: u64,
    pub positions_written: u64,
    pub positions_dropped: u64,
    pub commands_dispatched: u64,
    pub command_dispatch_success: u64,
    pub command_dispatch_failure: u64,
    pub command_dispatch_latency_ms_total: u64,
    pub command_dispatch_latency_ms_count: u64,
}

/// 进程级计数指标。
pub struct TelemetryMetrics {
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    frames_received: AtomicU64,
    framing_errors: AtomicU64,
    frames_malformed: AtomicU64,
    unknown_devices: AtomicU64,
    positions_decoded: AtomicU64,
    sessions_bound: AtomicU64,
    sessions_superseded: AtomicU64,
    backpressure_closes: AtomicU64,
    positions_written: AtomicU64,
    positions_dropped: AtomicU64,
    commands_dispatched: AtomicU64,
    command_dispatch_success: AtomicU64,
    command_dispatch_failure: AtomicU64,
    command_dispatch_latency_ms_total: AtomicU64,
    command_dispatch_latency_ms_count: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            framing_errors: AtomicU64::new(0),
            frames_malformed: AtomicU64::new(0),
            unknown_devices: AtomicU64::new(0),
            positions_decoded: AtomicU64::new(0),
            sessions_bound: AtomicU64::new(0),
            sessions_superseded: AtomicU64::new(0),
            backpressure_closes: AtomicU64::new(0),
            positions_written: AtomicU64::new(0),
            positions_dropped: AtomicU64::new(0),
            commands_dispatched: AtomicU64::new(0),
            command_dispatch_success: AtomicU64::new(0),
            command_dispatch_failure: AtomicU64::new(0),
            command_dispatch_latency_ms_total: AtomicU64::new(0),
            command_dispatch_latency_ms_count: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            framing_errors: self.framing_errors.load(Ordering::Relaxed),
            frames_malformed: self.frames_malformed.load(Ordering::Relaxed),
            unknown_devices: self.unknown_devices.load(Ordering::Relaxed),
            positions_decoded: self.positions_decoded.load(Ordering::Relaxed),
            sessions_bound: self.sessions_bound.load(Ordering::Relaxed),
            sessions_superseded: self.sessions_superseded.load(Ordering::Relaxed),
            backpressure_closes: self.backpressure_closes.load(Ordering::Relaxed),
            positions_written: self.positions_written.load(Ordering::Relaxed),
            positions_dropped: self.positions_dropped.load(Ordering::Relaxed),
            commands_dispatched: self.commands_dispatched.load(Ordering::Relaxed),
            command_dispatch_success: self.command_dispatch_success.load(Ordering::Relaxed),
            command_dispatch_failure: self.command_dispatch_failure.load(Ordering::Relaxed),
            command_dispatch_latency_ms_total: self
                .command_dispatch_latency_ms_total
                .load(Ordering::Relaxed),
            command_dispatch_latency_ms_count: self
                .command_dispatch_latency_ms_count
                .load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录新建连接（TCP 连接或 UDP 远端）。
pub fn record_connection_opened() {
    metrics().connections_opened.fetch_add(1, Ordering::Relaxed);
}

/// 记录连接关闭。
pub fn record_connection_closed() {
    metrics().connections_closed.fetch_add(1, Ordering::Relaxed);
}

/// 记录分帧成功的帧数。
pub fn record_frame_received() {
    metrics().frames_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录分帧错误（超长帧等，连接随之关闭）。
pub fn record_framing_error() {
    metrics().framing_errors.fetch_add(1, Ordering::Relaxed);
}

/// 记录无法解析的帧。
pub fn record_frame_malformed() {
    metrics().frames_malformed.fetch_add(1, Ordering::Relaxed);
}

/// 记录未知或停用设备的报文。
pub fn record_unknown_device() {
    metrics().unknown_devices.fetch_add(1, Ordering::Relaxed);
}

/// 记录解码产出的定位条数。
pub fn record_positions_decoded(count: u64) {
    metrics()
        .positions_decoded
        .fetch_add(count, Ordering::Relaxed);
}

/// 记录会话绑定。
pub fn record_session_bound() {
    metrics().sessions_bound.fetch_add(1, Ordering::Relaxed);
}

/// 记录被新连接顶替的会话。
pub fn record_session_superseded() {
    metrics().sessions_superseded.fetch_add(1, Ordering::Relaxed);
}

/// 记录因出站队列满而断开的连接。
pub fn record_backpressure_close() {
    metrics().backpressure_closes.fetch_add(1, Ordering::Relaxed);
}

/// 记录写入下游成功的定位条数。
pub fn record_positions_written(count: u64) {
    metrics()
        .positions_written
        .fetch_add(count, Ordering::Relaxed);
}

/// 记录流水线丢弃的定位（重复、非法、背压）。回填缓冲待重试的不计入。
pub fn record_positions_dropped(count: u64) {
    metrics()
        .positions_dropped
        .fetch_add(count, Ordering::Relaxed);
}

/// 记录命令下发请求次数。
pub fn record_command_dispatched() {
    metrics().commands_dispatched.fetch_add(1, Ordering::Relaxed);
}

/// 记录命令写入通道成功次数。
pub fn record_command_dispatch_success() {
    metrics()
        .command_dispatch_success
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录命令下发失败次数（无会话、不支持、写失败等）。
pub fn record_command_dispatch_failure() {
    metrics()
        .command_dispatch_failure
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录命令下发耗时（毫秒，包含查找+编码+写入确认）。
pub fn record_command_dispatch_latency_ms(latency_ms: u64) {
    let metrics = metrics();
    metrics
        .command_dispatch_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .command_dispatch_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}
