//! UDP 服务器实现
//!
//! 一个 socket 服务所有远端；每个远端地址是一个逻辑连接，
//! 拥有独立的分帧缓冲、解码器实例、写通道与空闲超时。

use crate::channel::{run_writer, ChannelHandle, ChannelId, DatagramWriter};
use crate::connection::{Connection, ServerContext};
use crate::error::ProtocolError;
use crate::module::ProtocolModule;
use crate::types::TransportKind;
use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

const MAX_DATAGRAM: usize = 65_535;
const REMOTE_INBOUND_QUEUE: usize = 64;

struct RemoteSlot {
    channel_id: ChannelId,
    inbound: mpsc::Sender<Bytes>,
}

/// 单协议 UDP 监听
pub struct UdpServer {
    module: Arc<dyn ProtocolModule>,
    socket: Arc<UdpSocket>,
    context: ServerContext,
}

impl UdpServer {
    pub async fn bind(
        module: Arc<dyn ProtocolModule>,
        addr: impl ToSocketAddrs,
        context: ServerContext,
    ) -> Result<Self, ProtocolError> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            module,
            socket: Arc::new(socket),
            context,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ProtocolError> {
        Ok(self.socket.local_addr()?)
    }

    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ProtocolError> {
        let local = self.local_addr()?;
        info!(
            target: "gateway.protocol",
            protocol = self.module.name(),
            addr = %local,
            "udp_server_listening"
        );

        let tracker = TaskTracker::new();
        let mut remotes: HashMap<SocketAddr, RemoteSlot> = HashMap::new();
        let (gone_tx, mut gone_rx) = mpsc::unbounded_channel::<(SocketAddr, ChannelId)>();
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some((remote, channel_id)) = gone_rx.recv() => {
                    if remotes.get(&remote).map(|slot| slot.channel_id) == Some(channel_id) {
                        remotes.remove(&remote);
                    }
                }
                received = self.socket.recv_from(&mut buf) => {
                    let (n, remote) = match received {
                        Ok(received) => received,
                        Err(err) => {
                            warn!(target: "gateway.protocol", error = %err, "udp_recv_failed");
                            continue;
                        }
                    };
                    let datagram = Bytes::copy_from_slice(&buf[..n]);
                    let live = remotes
                        .get(&remote)
                        .map(|slot| !slot.inbound.is_closed())
                        .unwrap_or(false);
                    if !live {
                        let slot = self.spawn_remote(remote, &tracker, &shutdown, gone_tx.clone());
                        remotes.insert(remote, slot);
                    }
                    if let Some(slot) = remotes.get(&remote) {
                        if slot.inbound.try_send(datagram).is_err() {
                            warn!(
                                target: "gateway.protocol",
                                remote = %remote,
                                "udp_datagram_dropped"
                            );
                        }
                    }
                }
            }
        }

        drop(remotes);
        tracker.close();
        tracker.wait().await;
        info!(
            target: "gateway.protocol",
            protocol = self.module.name(),
            addr = %local,
            "udp_server_stopped"
        );
        Ok(())
    }

    fn spawn_remote(
        &self,
        remote: SocketAddr,
        tracker: &TaskTracker,
        shutdown: &CancellationToken,
        gone: mpsc::UnboundedSender<(SocketAddr, ChannelId)>,
    ) -> RemoteSlot {
        let (channel, outbound) =
            ChannelHandle::new(remote, TransportKind::Udp, self.context.limits.outbound_queue);
        let (inbound_tx, inbound_rx) = mpsc::channel(REMOTE_INBOUND_QUEUE);
        let channel_id = channel.id();
        let writer = DatagramWriter {
            socket: Arc::clone(&self.socket),
            remote,
        };
        tracker.spawn(run_writer(writer, outbound, channel.closed_token()));
        tracker.spawn(serve_remote(
            channel,
            inbound_rx,
            Arc::clone(&self.module),
            self.context.clone(),
            shutdown.child_token(),
            gone,
        ));
        RemoteSlot {
            channel_id,
            inbound: inbound_tx,
        }
    }
}

async fn serve_remote(
    channel: ChannelHandle,
    mut inbound: mpsc::Receiver<Bytes>,
    module: Arc<dyn ProtocolModule>,
    context: ServerContext,
    shutdown: CancellationToken,
    gone: mpsc::UnboundedSender<(SocketAddr, ChannelId)>,
) {
    let remote = channel.remote();
    let channel_id = channel.id();
    let closed = channel.closed_token();
    let idle = context.limits.idle_timeout;
    let mut connection = Connection::open(module, channel, &context);

    let reason = loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break "shutdown".to_string(),
            _ = closed.cancelled() => break "channel closed".to_string(),
            received = tokio::time::timeout(idle, inbound.recv()) => received,
        };
        match received {
            Err(_) => break "idle timeout".to_string(),
            Ok(None) => break "listener stopped".to_string(),
            Ok(Some(datagram)) => {
                let received = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break "shutdown".to_string(),
                    _ = closed.cancelled() => break "channel closed".to_string(),
                    received = connection.receive(&datagram) => received,
                };
                if let Err(err) = received {
                    break err.to_string();
                }
            }
        }
    };

    inbound.close();
    connection.close(&reason);
    let _ = gone.send((remote, channel_id));
}
