//! 位置转发流水线
//!
//! 连接任务把解码出的位置送入有界通道，转发任务逐条交给 [`Pipeline`]：
//! 校验 → 去重 → 攒批 → 写入 [`PositionSink`]（失败重试，仍失败则回填缓冲）。

use async_trait::async_trait;
use domain::{Position, now_epoch_ms};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 写入结果。
#[derive(Debug, Clone)]
pub struct WriteResult {
    pub device_id: i64,
    pub written: bool,
    pub reason: Option<String>,
}

impl WriteResult {
    fn skipped(device_id: i64, reason: &str) -> Self {
        Self {
            device_id,
            written: false,
            reason: Some(reason.to_string()),
        }
    }

    fn written(device_id: i64) -> Self {
        Self {
            device_id,
            written: true,
            reason: None,
        }
    }
}

/// Pipeline 处理错误。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("sink error: {0}")]
    Sink(String),
    #[error("backpressure: {0}")]
    Backpressure(String),
    /// 下游写入失败，整批已回填缓冲等待下次 flush
    #[error("sink error, batch requeued: {0}")]
    Requeued(String),
    #[error("buffer overflow after retry: {dropped} positions dropped")]
    Overflow { dropped: usize },
}

impl PipelineError {
    /// 本次错误实际丢弃的定位条数。
    pub fn dropped(&self) -> usize {
        match self {
            PipelineError::Requeued(_) => 0,
            PipelineError::Overflow { dropped } => *dropped,
            PipelineError::Sink(_) | PipelineError::Backpressure(_) => 1,
        }
    }
}

/// Pipeline 参数。
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub max_buffer_size: usize,
    pub max_retries: usize,
    pub dedup_cache_size: usize,
    /// 设备时间早于该时长的位置视为过期（None 不检查）
    pub max_age_ms: Option<i64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_buffer_size: 1000,
            max_retries: 3,
            dedup_cache_size: 10_000,
            max_age_ms: None,
        }
    }
}

impl PipelineConfig {
    fn sanitized(mut self) -> Self {
        if self.batch_size == 0 {
            self.batch_size = 1;
        }
        if self.max_buffer_size < self.batch_size {
            self.max_buffer_size = self.batch_size;
        }
        self
    }
}

/// 去重键：同一设备、同一设备时间、同一坐标与属性
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PositionKey {
    device_id: i64,
    device_time_ms: i64,
    latitude: u64,
    longitude: u64,
    attributes: String,
}

impl PositionKey {
    fn of(position: &Position) -> Self {
        let attributes = position
            .attributes
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(";");
        Self {
            device_id: position.device_id,
            device_time_ms: position.device_time_ms,
            latitude: position.latitude.to_bits(),
            longitude: position.longitude.to_bits(),
            attributes,
        }
    }
}

/// 有界去重缓存，超出容量时淘汰最早的键
struct DedupState {
    seen: HashSet<PositionKey>,
    order: VecDeque<PositionKey>,
    capacity: usize,
}

impl DedupState {
    fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn is_duplicate(&mut self, key: PositionKey) -> bool {
        if self.capacity == 0 {
            return false;
        }
        if self.seen.contains(&key) {
            return true;
        }
        self.seen.insert(key.clone());
        self.order.push_back(key);
        while self.seen.len() > self.capacity {
            match self.order.pop_front() {
                Some(evicted) => {
                    self.seen.remove(&evicted);
                }
                None => break,
            }
        }
        false
    }
}

/// 位置下游抽象（持久化、转发等由外部实现）。
#[async_trait]
pub trait PositionSink: Send + Sync {
    async fn accept(&self, position: Position) -> Result<WriteResult, PipelineError>;

    async fn accept_batch(&self, positions: &[Position]) -> Result<Vec<WriteResult>, PipelineError> {
        let mut results = Vec::with_capacity(positions.len());
        for position in positions {
            results.push(self.accept(position.clone()).await?);
        }
        Ok(results)
    }
}

struct PipelineState {
    buffer: Vec<Position>,
    dedup: DedupState,
}

struct PipelineInner {
    sink: Arc<dyn PositionSink>,
    config: PipelineConfig,
    state: Mutex<PipelineState>,
}

/// Pipeline 入口。
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

impl Pipeline {
    pub fn new(sink: Arc<dyn PositionSink>) -> Self {
        Self::with_config(sink, PipelineConfig::default())
    }

    pub fn with_config(sink: Arc<dyn PositionSink>, config: PipelineConfig) -> Self {
        let config = config.sanitized();
        let inner = PipelineInner {
            sink,
            config: config.clone(),
            state: Mutex::new(PipelineState {
                buffer: Vec::new(),
                dedup: DedupState::new(config.dedup_cache_size),
            }),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub async fn handle(&self, position: Position) -> Result<WriteResult, PipelineError> {
        let device_id = position.device_id;

        if let Some(reason) = validate_position(&position, self.inner.config.max_age_ms) {
            return Ok(WriteResult::skipped(device_id, reason));
        }

        let mut state = self.inner.state.lock().await;
        if state.buffer.len() >= self.inner.config.max_buffer_size {
            return Err(PipelineError::Backpressure("buffer full".to_string()));
        }
        if state.dedup.is_duplicate(PositionKey::of(&position)) {
            return Ok(WriteResult::skipped(device_id, "duplicate"));
        }
        state.buffer.push(position);
        let index = state.buffer.len().saturating_sub(1);
        if state.buffer.len() < self.inner.config.batch_size {
            return Ok(WriteResult::skipped(device_id, "queued"));
        }
        let batch = std::mem::take(&mut state.buffer);
        drop(state);

        match self.write_batch_with_retry(&batch).await {
            Ok(results) => Ok(results
                .get(index)
                .cloned()
                .unwrap_or_else(|| WriteResult::written(device_id))),
            Err(err) => {
                self.requeue(batch).await?;
                Err(PipelineError::Requeued(err.to_string()))
            }
        }
    }

    pub async fn flush(&self) -> Result<Vec<(Position, WriteResult)>, PipelineError> {
        let mut state = self.inner.state.lock().await;
        if state.buffer.is_empty() {
            return Ok(Vec::new());
        }
        let batch = std::mem::take(&mut state.buffer);
        drop(state);

        match self.write_batch_with_retry(&batch).await {
            Ok(results) => Ok(batch.into_iter().zip(results).collect()),
            Err(err) => {
                self.requeue(batch).await?;
                Err(PipelineError::Requeued(err.to_string()))
            }
        }
    }

    pub async fn buffered(&self) -> usize {
        self.inner.state.lock().await.buffer.len()
    }

    async fn write_batch_with_retry(
        &self,
        positions: &[Position],
    ) -> Result<Vec<WriteResult>, PipelineError> {
        let mut attempt = 0;
        loop {
            match self.inner.sink.accept_batch(positions).await {
                Ok(results) => {
                    let written = results.iter().filter(|result| result.written).count();
                    gateway_telemetry::record_positions_written(written as u64);
                    return Ok(results);
                }
                Err(err) => {
                    attempt += 1;
                    if attempt > self.inner.config.max_retries {
                        return Err(err);
                    }
                }
            }
        }
    }

    async fn requeue(&self, mut positions: Vec<Position>) -> Result<(), PipelineError> {
        if positions.is_empty() {
            return Ok(());
        }
        let mut state = self.inner.state.lock().await;
        if state.buffer.len() + positions.len() > self.inner.config.max_buffer_size {
            return Err(PipelineError::Overflow {
                dropped: positions.len(),
            });
        }
        state.buffer.append(&mut positions);
        Ok(())
    }
}

fn validate_position(position: &Position, max_age_ms: Option<i64>) -> Option<&'static str> {
    if position.device_time_ms <= 0 {
        return Some("invalid_time");
    }
    let coordinates = [position.latitude, position.longitude, position.speed, position.course];
    if coordinates.iter().any(|value| !value.is_finite())
        || !(-90.0..=90.0).contains(&position.latitude)
        || !(-180.0..=180.0).contains(&position.longitude)
    {
        return Some("invalid_coordinates");
    }
    if let Some(max_age) = max_age_ms {
        if now_epoch_ms().saturating_sub(position.device_time_ms) > max_age {
            return Some("stale");
        }
    }
    None
}

/// 启动转发任务：从通道接收位置交给 Pipeline，定期 flush，通道关闭后做最后一次 flush。
pub fn spawn_position_forwarder(
    mut positions: mpsc::Receiver<Position>,
    pipeline: Pipeline,
    flush_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                received = positions.recv() => match received {
                    Some(position) => forward(&pipeline, position).await,
                    None => break,
                },
                _ = ticker.tick() => {
                    if let Err(err) = pipeline.flush().await {
                        warn!(target: "gateway.pipeline", error = %err, "position_flush_failed");
                    }
                }
            }
        }
        match pipeline.flush().await {
            Ok(flushed) => info!(
                target: "gateway.pipeline",
                flushed = flushed.len(),
                "position_forwarder_stopped"
            ),
            Err(err) => warn!(target: "gateway.pipeline", error = %err, "position_flush_failed"),
        }
    })
}

async fn forward(pipeline: &Pipeline, position: Position) {
    let device_id = position.device_id;
    match pipeline.handle(position).await {
        Ok(result) => {
            if let Some(reason) = result.reason.as_deref() {
                if reason != "queued" {
                    debug!(
                        target: "gateway.pipeline",
                        device_id,
                        reason,
                        written = result.written,
                        "position_skipped"
                    );
                    if !result.written {
                        gateway_telemetry::record_positions_dropped(1);
                    }
                }
            }
        }
        Err(err) => match err.dropped() {
            0 => warn!(
                target: "gateway.pipeline",
                device_id,
                error = %err,
                "position_requeued"
            ),
            dropped => {
                gateway_telemetry::record_positions_dropped(dropped as u64);
                warn!(
                    target: "gateway.pipeline",
                    device_id,
                    dropped,
                    error = %err,
                    "position_dropped"
                );
            }
        },
    }
}

/// 空下游（用于接线与测试）。
#[derive(Debug, Default)]
pub struct NoopPositionSink;

#[async_trait]
impl PositionSink for NoopPositionSink {
    async fn accept(&self, position: Position) -> Result<WriteResult, PipelineError> {
        Ok(WriteResult::skipped(position.device_id, "noop"))
    }
}

/// 日志下游：每条位置输出一条结构化日志。
#[derive(Debug, Default)]
pub struct LoggingPositionSink;

#[async_trait]
impl PositionSink for LoggingPositionSink {
    async fn accept(&self, position: Position) -> Result<WriteResult, PipelineError> {
        info!(
            target: "gateway.pipeline",
            device_id = position.device_id,
            protocol = %position.protocol,
            device_time_ms = position.device_time_ms,
            valid = position.valid,
            latitude = position.latitude,
            longitude = position.longitude,
            speed = position.speed,
            course = position.course,
            attributes = ?position.attributes,
            "position_accepted"
        );
        Ok(WriteResult::written(position.device_id))
    }
}
