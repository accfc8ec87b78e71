//! 运行时装配
//!
//! 设备目录 → 会话注册表 → 协议监听 → 位置转发流水线 → 命令下发服务，
//! 并把 HTTP 层需要的句柄收拢到 [`AppState`]。

use gateway_config::AppConfig;
use gateway_control::{CommandService, CommandServiceConfig, DispatcherConfig, SessionDispatcher};
use gateway_pipeline::{LoggingPositionSink, Pipeline, PipelineConfig, spawn_position_forwarder};
use gateway_protocol::{
    ConnectionLimits, PolicyOverrides, ProtocolError, ProtocolRegistry, RunningServer,
    ServerContext, SessionRegistry,
};
use gateway_storage::{DeviceDirectory, InMemoryDeviceDirectory, PgDeviceDirectory, StorageError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const POSITION_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),
}

/// HTTP 层共享状态
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    pub commands: Arc<CommandService>,
    pub protocols: Arc<ProtocolRegistry>,
    pub ports: Arc<BTreeMap<String, u16>>,
}

/// 运行中的网关
pub struct Gateway {
    pub state: AppState,
    servers: Vec<RunningServer>,
    forwarder: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl Gateway {
    pub async fn start(config: &AppConfig) -> Result<Self, RuntimeError> {
        let directory = open_directory(config).await?;
        let sessions = Arc::new(SessionRegistry::new());
        let protocols = Arc::new(ProtocolRegistry::with_builtin());
        let shutdown = CancellationToken::new();

        let (positions_tx, positions_rx) = mpsc::channel(config.position_queue.max(1));
        let pipeline = Pipeline::with_config(
            Arc::new(LoggingPositionSink),
            PipelineConfig {
                batch_size: config.position_batch_size,
                dedup_cache_size: config.position_dedup_cache,
                ..PipelineConfig::default()
            },
        );
        let forwarder = spawn_position_forwarder(positions_rx, pipeline, POSITION_FLUSH_INTERVAL);

        let context = ServerContext::new(Arc::clone(&directory), Arc::clone(&sessions), positions_tx)
            .with_limits(ConnectionLimits {
                idle_timeout: Duration::from_secs(config.idle_timeout_seconds),
                outbound_queue: config.outbound_queue.max(1),
            })
            .with_overrides(PolicyOverrides {
                close_on_unknown_device: config.close_on_unknown_device,
                max_decode_failures: config.max_decode_failures,
            });
        let servers = protocols
            .start(&config.listen_host, &config.protocol_ports, context, shutdown.clone())
            .await?;
        if servers.is_empty() {
            warn!(target: "gateway.protocol", "no_protocol_ports_configured");
        }

        let dispatcher = SessionDispatcher::new(
            directory,
            Arc::clone(&sessions),
            DispatcherConfig {
                write_timeout: Duration::from_millis(config.dispatch_timeout_ms),
            },
        );
        let commands = CommandService::new_with_config(
            Arc::new(dispatcher),
            CommandServiceConfig {
                dispatch_max_retries: config.dispatch_max_retries,
                dispatch_backoff_ms: config.dispatch_backoff_ms,
            },
        );

        Ok(Self {
            state: AppState {
                sessions,
                commands: Arc::new(commands),
                protocols,
                ports: Arc::new(config.protocol_ports.clone()),
            },
            servers,
            forwarder,
            shutdown,
        })
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// 等待全部监听退出，再等转发任务把剩余位置 flush 完
    pub async fn wait(self) {
        for server in self.servers {
            match server.handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(
                    target: "gateway.protocol",
                    protocol = server.protocol,
                    error = %err,
                    "protocol_listener_failed"
                ),
                Err(err) => warn!(
                    target: "gateway.protocol",
                    protocol = server.protocol,
                    error = %err,
                    "protocol_listener_panicked"
                ),
            }
        }
        if let Err(err) = self.forwarder.await {
            warn!(target: "gateway.pipeline", error = %err, "position_forwarder_panicked");
        }
        info!(target: "gateway.http", "gateway_stopped");
    }
}

async fn open_directory(config: &AppConfig) -> Result<Arc<dyn DeviceDirectory>, RuntimeError> {
    match &config.database_url {
        Some(url) => {
            let directory = PgDeviceDirectory::connect(url).await?;
            info!(target: "gateway.storage", "device_directory_postgres");
            Ok(Arc::new(directory))
        }
        None => {
            let seeds = config
                .seed_devices
                .iter()
                .map(|(unique_id, id)| (unique_id.clone(), *id));
            info!(
                target: "gateway.storage",
                devices = config.seed_devices.len(),
                "device_directory_in_memory"
            );
            Ok(Arc::new(InMemoryDeviceDirectory::from_seeds(seeds)))
        }
    }
}
