//! TCP 服务器实现
//!
//! 监听协议端口，每个连接一个任务：读取 → 分帧 → 解码，
//! 写出由连接专属的写任务完成。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let server = TcpServer::bind(module, "0.0.0.0:5221", context).await?;
//! let shutdown = CancellationToken::new();
//! tokio::spawn(server.run(shutdown.clone()));
//! ```

use crate::channel::{run_writer, ChannelHandle, StreamWriter};
use crate::connection::{Connection, ServerContext};
use crate::error::ProtocolError;
use crate::module::ProtocolModule;
use crate::types::TransportKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

const READ_BUFFER_SIZE: usize = 2048;
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// 单协议 TCP 监听
pub struct TcpServer {
    module: Arc<dyn ProtocolModule>,
    listener: TcpListener,
    context: ServerContext,
}

impl TcpServer {
    pub async fn bind(
        module: Arc<dyn ProtocolModule>,
        addr: impl ToSocketAddrs,
        context: ServerContext,
    ) -> Result<Self, ProtocolError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            module,
            listener,
            context,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ProtocolError> {
        Ok(self.listener.local_addr()?)
    }

    /// 运行监听，直到 `shutdown` 触发且所有连接任务退出
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ProtocolError> {
        let local = self.local_addr()?;
        info!(
            target: "gateway.protocol",
            protocol = self.module.name(),
            addr = %local,
            "tcp_server_listening"
        );

        let tracker = TaskTracker::new();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracker.spawn(serve_connection(
                            stream,
                            peer,
                            Arc::clone(&self.module),
                            self.context.clone(),
                            shutdown.child_token(),
                        ));
                    }
                    Err(err) => {
                        error!(target: "gateway.protocol", error = %err, "tcp_accept_failed");
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    }
                },
            }
        }

        tracker.close();
        tracker.wait().await;
        info!(
            target: "gateway.protocol",
            protocol = self.module.name(),
            addr = %local,
            "tcp_server_stopped"
        );
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    module: Arc<dyn ProtocolModule>,
    context: ServerContext,
    shutdown: CancellationToken,
) {
    let _ = stream.set_nodelay(true);
    let (mut reader, writer) = stream.into_split();
    let (channel, outbound) =
        ChannelHandle::new(peer, TransportKind::Tcp, context.limits.outbound_queue);
    let closed = channel.closed_token();
    let writer_task = tokio::spawn(run_writer(StreamWriter(writer), outbound, closed.clone()));

    let mut connection = Connection::open(module, channel, &context);
    let idle = context.limits.idle_timeout;
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    let reason = loop {
        let read = tokio::select! {
            _ = shutdown.cancelled() => break "shutdown".to_string(),
            _ = closed.cancelled() => break "channel closed".to_string(),
            read = tokio::time::timeout(idle, reader.read(&mut buf)) => read,
        };
        match read {
            Err(_) => break "idle timeout".to_string(),
            Ok(Ok(0)) => break "closed by peer".to_string(),
            Ok(Ok(n)) => {
                // 下游位置通道满时 receive 会阻塞，关停信号须能打断
                let received = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break "shutdown".to_string(),
                    _ = closed.cancelled() => break "channel closed".to_string(),
                    received = connection.receive(&buf[..n]) => received,
                };
                if let Err(err) = received {
                    break err.to_string();
                }
            }
            Ok(Err(err)) => break format!("read error: {err}"),
        }
    };

    connection.close(&reason);
    let _ = writer_task.await;
}
