//! 命令下发
//!
//! 调用方构造规范 [`Command`]，调度器按设备查找当前会话，
//! 用会话所属协议的编码器生成报文，交给该连接唯一的写任务写出。
//!
//! ```text
//! CommandService::issue_command
//!       │  重试（仅传输错误）/ 指标 / 日志
//!       ▼
//! SessionDispatcher::dispatch
//!       │  设备目录 → 会话注册表 → ProtocolModule::encode_command → ChannelHandle::write
//!       ▼
//! DispatchReceipt | DispatchError
//! ```

use async_trait::async_trait;
use domain::{Command, CommandType, now_epoch_ms};
use gateway_protocol::{ChannelId, EncodeError, ProtocolError, SessionError, SessionRegistry};
use gateway_storage::DeviceDirectory;
use gateway_telemetry::{
    record_command_dispatch_failure, record_command_dispatch_latency_ms,
    record_command_dispatch_success, record_command_dispatched,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// 下发成功回执（报文已由写任务写出）。
#[derive(Debug, Clone)]
pub struct DispatchReceipt {
    pub dispatch_id: String,
    pub device_id: i64,
    pub protocol: String,
    pub channel_id: ChannelId,
    pub bytes_written: usize,
    pub dispatched_at_ms: i64,
}

/// 下发错误。
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("device unknown: {0}")]
    DeviceUnknown(i64),
    #[error("no active session for device {0}")]
    NoActiveSession(i64),
    #[error("command type {kind} unsupported by protocol {protocol}")]
    Unsupported { protocol: String, kind: CommandType },
    #[error("encode error: {0}")]
    Encode(String),
    /// 报文确认未写出
    #[error("transport write failure: {0}")]
    Transport(String),
    /// 报文可能已写出，结果未知（不可重试，避免重复执行）
    #[error("write outcome unknown: {0}")]
    Unconfirmed(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl DispatchError {
    /// 只有确认未写出的传输错误值得重试（设备可能已在新连接上重新上线）
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Transport(_))
    }
}

impl From<SessionError> for DispatchError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NoActiveSession(device_id) => DispatchError::NoActiveSession(device_id),
        }
    }
}

impl From<EncodeError> for DispatchError {
    fn from(err: EncodeError) -> Self {
        match err {
            EncodeError::Unsupported { protocol, kind } => DispatchError::Unsupported {
                protocol: protocol.to_string(),
                kind,
            },
            other => DispatchError::Encode(other.to_string()),
        }
    }
}

/// 命令下发器抽象。
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    async fn dispatch(&self, command: &Command) -> Result<DispatchReceipt, DispatchError>;
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// 入队加写出的总时限
    pub write_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(5),
        }
    }
}

/// 基于会话注册表的下发器。
pub struct SessionDispatcher {
    directory: Arc<dyn DeviceDirectory>,
    sessions: Arc<SessionRegistry>,
    config: DispatcherConfig,
}

impl SessionDispatcher {
    pub fn new(
        directory: Arc<dyn DeviceDirectory>,
        sessions: Arc<SessionRegistry>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            directory,
            sessions,
            config,
        }
    }
}

#[async_trait]
impl CommandDispatcher for SessionDispatcher {
    async fn dispatch(&self, command: &Command) -> Result<DispatchReceipt, DispatchError> {
        let device = self
            .directory
            .find_device_by_id(command.device_id)
            .await
            .map_err(|err| DispatchError::Storage(err.to_string()))?
            .filter(|device| device.enabled)
            .ok_or(DispatchError::DeviceUnknown(command.device_id))?;

        let route = self.sessions.lookup(device.id)?;
        let payload = route.module.encode_command(command, &device)?;
        let bytes_written = payload.len();

        match route.channel.write(payload, self.config.write_timeout).await {
            Ok(()) => Ok(DispatchReceipt {
                dispatch_id: uuid::Uuid::new_v4().to_string(),
                device_id: device.id,
                protocol: route.session.protocol.clone(),
                channel_id: route.channel.id(),
                bytes_written,
                dispatched_at_ms: now_epoch_ms(),
            }),
            Err(err @ (ProtocolError::ChannelClosed | ProtocolError::WriteTimedOut)) => Err(
                DispatchError::Transport(format!(
                    "{err} (timeout {}ms)",
                    self.config.write_timeout.as_millis()
                )),
            ),
            Err(err) => Err(DispatchError::Unconfirmed(err.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandServiceConfig {
    pub dispatch_max_retries: u64,
    pub dispatch_backoff_ms: u64,
}

/// 命令服务：下发入口，负责重试、指标与日志。
pub struct CommandService {
    dispatcher: Arc<dyn CommandDispatcher>,
    config: CommandServiceConfig,
}

impl CommandService {
    pub fn new(dispatcher: Arc<dyn CommandDispatcher>) -> Self {
        Self::new_with_config(dispatcher, CommandServiceConfig::default())
    }

    pub fn new_with_config(
        dispatcher: Arc<dyn CommandDispatcher>,
        config: CommandServiceConfig,
    ) -> Self {
        Self { dispatcher, config }
    }

    pub async fn issue_command(&self, command: Command) -> Result<DispatchReceipt, DispatchError> {
        record_command_dispatched();
        let started_at = Instant::now();
        info!(
            target: "gateway.control",
            device_id = command.device_id,
            command_type = %command.kind,
            attributes = command.attributes.len(),
            "command_dispatch_requested"
        );

        let result = dispatch_with_retry(
            self.dispatcher.clone(),
            &command,
            self.config.dispatch_max_retries,
            self.config.dispatch_backoff_ms,
        )
        .await;
        record_command_dispatch_latency_ms(started_at.elapsed().as_millis() as u64);

        match &result {
            Ok(receipt) => {
                record_command_dispatch_success();
                info!(
                    target: "gateway.control",
                    device_id = receipt.device_id,
                    command_type = %command.kind,
                    dispatch_id = %receipt.dispatch_id,
                    protocol = %receipt.protocol,
                    channel = %receipt.channel_id,
                    bytes = receipt.bytes_written,
                    "command_dispatched"
                );
            }
            Err(err) => {
                record_command_dispatch_failure();
                warn!(
                    target: "gateway.control",
                    device_id = command.device_id,
                    command_type = %command.kind,
                    error = %err,
                    "command_dispatch_failed"
                );
            }
        }
        result
    }
}

async fn dispatch_with_retry(
    dispatcher: Arc<dyn CommandDispatcher>,
    command: &Command,
    max_retries: u64,
    backoff_ms: u64,
) -> Result<DispatchReceipt, DispatchError> {
    let mut attempt = 0u64;
    loop {
        match dispatcher.dispatch(command).await {
            Ok(receipt) => return Ok(receipt),
            Err(err) => {
                attempt += 1;
                if !err.is_retryable() || attempt > max_retries {
                    return Err(err);
                }
                if backoff_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_retry() {
        assert!(DispatchError::Transport("reset".into()).is_retryable());
        assert!(!DispatchError::NoActiveSession(1).is_retryable());
        assert!(!DispatchError::DeviceUnknown(1).is_retryable());
        assert!(!DispatchError::Unconfirmed("deadline".into()).is_retryable());
    }

    #[test]
    fn encode_errors_map_to_dispatch_errors() {
        let err: DispatchError = EncodeError::Unsupported {
            protocol: "mobilogix",
            kind: CommandType::AlarmArm,
        }
        .into();
        assert!(matches!(
            err,
            DispatchError::Unsupported { ref protocol, kind: CommandType::AlarmArm } if protocol == "mobilogix"
        ));
        let err: DispatchError = EncodeError::MissingParameter("data").into();
        assert!(matches!(err, DispatchError::Encode(_)));
    }
}
