//! 单连接处理
//!
//! [`Connection`] 持有连接的流水线实例与累积缓冲，把入站字节切帧、解码，
//! 并按连接策略处理每类错误：
//!
//! | 错误 | 处理 |
//! |------|------|
//! | 分帧失败 | 关闭连接 |
//! | 报文格式错误 | 丢弃该帧；连续失败达到阈值时关闭 |
//! | 设备未知 / 停用 | 按策略丢弃或关闭 |
//! | 应答背压 | 关闭连接 |
//!
//! 解码产出的位置交给下游位置通道；连接关闭时解绑会话。

use crate::channel::ChannelHandle;
use crate::codec::Message;
use crate::error::{DecodeError, ProtocolError};
use crate::module::ProtocolModule;
use crate::pipeline::ConnectionPipeline;
use crate::session::{DeviceSession, SessionRegistry};
use crate::types::{ConnectionLimits, ConnectionPolicy, PolicyOverrides};
use bytes::BytesMut;
use domain::Position;
use gateway_storage::DeviceDirectory;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// 所有监听共享的外部依赖
#[derive(Clone)]
pub struct ServerContext {
    pub directory: Arc<dyn DeviceDirectory>,
    pub sessions: Arc<SessionRegistry>,
    pub positions: mpsc::Sender<Position>,
    pub limits: ConnectionLimits,
    pub overrides: PolicyOverrides,
}

impl ServerContext {
    pub fn new(
        directory: Arc<dyn DeviceDirectory>,
        sessions: Arc<SessionRegistry>,
        positions: mpsc::Sender<Position>,
    ) -> Self {
        Self {
            directory,
            sessions,
            positions,
            limits: ConnectionLimits::default(),
            overrides: PolicyOverrides::default(),
        }
    }

    pub fn with_limits(mut self, limits: ConnectionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_overrides(mut self, overrides: PolicyOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

/// 解码器可见的连接上下文：身份解析与应答写出
pub struct ConnectionContext {
    channel: ChannelHandle,
    module: Arc<dyn ProtocolModule>,
    directory: Arc<dyn DeviceDirectory>,
    sessions: Arc<SessionRegistry>,
    identified: HashMap<String, DeviceSession>,
    current: Option<DeviceSession>,
}

impl ConnectionContext {
    pub fn new(
        channel: ChannelHandle,
        module: Arc<dyn ProtocolModule>,
        directory: Arc<dyn DeviceDirectory>,
        sessions: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            channel,
            module,
            directory,
            sessions,
            identified: HashMap::new(),
            current: None,
        }
    }

    pub fn channel(&self) -> &ChannelHandle {
        &self.channel
    }

    pub fn protocol(&self) -> &'static str {
        self.module.name()
    }

    /// 解析报文中的设备标识并绑定会话
    ///
    /// 同一连接上已识别且仍绑定在本连接的设备不再查目录；
    /// 会话已被其他连接接管时重新绑定到本连接。
    pub async fn resolve_device(&mut self, unique_id: &str) -> Result<DeviceSession, DecodeError> {
        if let Some(session) = self.identified.get(unique_id) {
            if self
                .sessions
                .is_bound_to(session.device_id, self.channel.id())
            {
                let session = session.clone();
                self.current = Some(session.clone());
                return Ok(session);
            }
        }

        let device = self
            .directory
            .find_device(unique_id)
            .await
            .map_err(|e| DecodeError::Directory(e.to_string()))?
            .ok_or_else(|| DecodeError::UnknownDevice(unique_id.to_string()))?;
        if !device.enabled {
            return Err(DecodeError::DeviceDisabled(unique_id.to_string()));
        }

        let session = DeviceSession {
            device_id: device.id,
            unique_id: device.unique_id.clone(),
            protocol: self.module.name().to_string(),
        };
        let superseded = self.sessions.bind(
            session.clone(),
            self.channel.clone(),
            Arc::clone(&self.module),
        );
        gateway_telemetry::record_session_bound();
        if let Some(previous) = superseded {
            gateway_telemetry::record_session_superseded();
            info!(
                target: "gateway.protocol",
                device_id = device.id,
                channel = %self.channel.id(),
                previous_channel = %previous,
                "session_superseded"
            );
        }
        info!(
            target: "gateway.protocol",
            protocol = self.module.name(),
            device_id = device.id,
            unique_id = %device.unique_id,
            channel = %self.channel.id(),
            remote = %self.channel.remote(),
            "session_bound"
        );

        self.identified
            .insert(unique_id.to_string(), session.clone());
        self.current = Some(session.clone());
        Ok(session)
    }

    /// 连接上最近识别的设备（报文不携带标识时使用）
    pub fn current_device(&self) -> Result<DeviceSession, DecodeError> {
        self.current.clone().ok_or(DecodeError::Unidentified)
    }

    /// 写出协议应答；出站队列满视为背压，连接随后关闭
    pub fn reply(&self, message: Message) -> Result<(), DecodeError> {
        let payload = self.module.pipeline().encode_message(message);
        self.channel.try_send(payload).map_err(DecodeError::from)
    }
}

/// 一个逻辑连接（TCP 连接或 UDP 远端地址）
pub struct Connection {
    ctx: ConnectionContext,
    pipeline: ConnectionPipeline,
    buffer: BytesMut,
    positions: mpsc::Sender<Position>,
    policy: ConnectionPolicy,
    consecutive_failures: u32,
}

impl Connection {
    pub fn open(
        module: Arc<dyn ProtocolModule>,
        channel: ChannelHandle,
        server: &ServerContext,
    ) -> Self {
        gateway_telemetry::record_connection_opened();
        info!(
            target: "gateway.protocol",
            protocol = module.name(),
            transport = %channel.transport(),
            channel = %channel.id(),
            remote = %channel.remote(),
            "connection_opened"
        );
        let policy = module.policy().with_overrides(server.overrides);
        let pipeline = module.assemble();
        let ctx = ConnectionContext::new(
            channel,
            module,
            Arc::clone(&server.directory),
            Arc::clone(&server.sessions),
        );
        Self {
            ctx,
            pipeline,
            buffer: BytesMut::with_capacity(1024),
            positions: server.positions.clone(),
            policy,
            consecutive_failures: 0,
        }
    }

    pub fn channel(&self) -> &ChannelHandle {
        self.ctx.channel()
    }

    pub fn policy(&self) -> ConnectionPolicy {
        self.policy
    }

    /// 处理一段入站字节；返回错误表示连接必须关闭
    pub async fn receive(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.buffer.extend_from_slice(data);
        loop {
            let frame = match self.pipeline.split(&mut self.buffer) {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(err) => {
                    gateway_telemetry::record_framing_error();
                    warn!(
                        target: "gateway.protocol",
                        channel = %self.ctx.channel.id(),
                        error = %err,
                        "framing_failed"
                    );
                    return Err(ProtocolError::Framing(err));
                }
            };
            gateway_telemetry::record_frame_received();
            self.handle_frame(frame).await?;
        }
    }

    async fn handle_frame(&mut self, frame: BytesMut) -> Result<(), ProtocolError> {
        let decoded = match self.pipeline.to_message(frame) {
            Ok(message) => self.pipeline.decoder.decode(&mut self.ctx, message).await,
            Err(err) => Err(err),
        };

        match decoded {
            Ok(positions) => {
                self.consecutive_failures = 0;
                if positions.is_empty() {
                    return Ok(());
                }
                gateway_telemetry::record_positions_decoded(positions.len() as u64);
                for position in positions {
                    debug!(
                        target: "gateway.protocol",
                        device_id = position.device_id,
                        valid = position.valid,
                        "position_decoded"
                    );
                    self.positions
                        .send(position)
                        .await
                        .map_err(|_| ProtocolError::SinkClosed)?;
                }
                Ok(())
            }
            Err(DecodeError::Connection(err)) => {
                if matches!(err, ProtocolError::Backpressure) {
                    gateway_telemetry::record_backpressure_close();
                }
                Err(err)
            }
            Err(err) if err.is_identity() => {
                gateway_telemetry::record_unknown_device();
                warn!(
                    target: "gateway.protocol",
                    channel = %self.ctx.channel.id(),
                    remote = %self.ctx.channel.remote(),
                    error = %err,
                    close = self.policy.close_on_unknown_device,
                    "device_rejected"
                );
                if self.policy.close_on_unknown_device {
                    Err(ProtocolError::DeviceRejected(err.to_string()))
                } else {
                    Ok(())
                }
            }
            Err(DecodeError::Directory(message)) => {
                warn!(
                    target: "gateway.protocol",
                    channel = %self.ctx.channel.id(),
                    error = %message,
                    "device_lookup_failed"
                );
                Ok(())
            }
            Err(err) => {
                gateway_telemetry::record_frame_malformed();
                self.consecutive_failures += 1;
                warn!(
                    target: "gateway.protocol",
                    channel = %self.ctx.channel.id(),
                    error = %err,
                    consecutive = self.consecutive_failures,
                    "frame_dropped"
                );
                let max = self.policy.max_decode_failures;
                if max > 0 && self.consecutive_failures >= max {
                    Err(ProtocolError::TooManyFailures(self.consecutive_failures))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// 关闭连接：解绑会话并停止写任务，返回被解绑的设备
    pub fn close(self, reason: &str) -> Vec<i64> {
        let channel = self.ctx.channel;
        let unbound = self.ctx.sessions.unbind(channel.id());
        channel.close();
        gateway_telemetry::record_connection_closed();
        info!(
            target: "gateway.protocol",
            channel = %channel.id(),
            remote = %channel.remote(),
            reason,
            unbound = ?unbound,
            "connection_closed"
        );
        unbound
    }
}
