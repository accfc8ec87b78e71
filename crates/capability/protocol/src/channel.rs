//! 连接写通道
//!
//! 每个连接只有一个写任务，解码器应答与命令下发都通过有界队列交给它，
//! 同一连接上的写入因此按入队顺序串行。
//!
//! 带确认的写入持有一张凭据：写任务先占用凭据再写，等待方超时则先放弃凭据。
//! 两者只有一方成功，所以超时返回的 [`ProtocolError::WriteTimedOut`]
//! 保证报文从未写出；已开始写出的报文超时只能报告 `WriteUnconfirmed`。
//! 连接关闭后队列中剩余的报文一律丢弃，不再写出。

use crate::error::ProtocolError;
use crate::types::TransportKind;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

const WRITE_PENDING: u8 = 0;
const WRITE_STARTED: u8 = 1;
const WRITE_ABANDONED: u8 = 2;

/// 进程内唯一的连接标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    pub fn next() -> Self {
        Self(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// 出站报文；`ticket` 存在时写完回报结果
pub(crate) struct Outbound {
    payload: Bytes,
    ticket: Option<WriteTicket>,
}

/// 带确认写入的凭据
pub(crate) struct WriteTicket {
    state: Arc<AtomicU8>,
    done: oneshot::Sender<io::Result<()>>,
}

impl WriteTicket {
    /// 写任务占用凭据；等待方已放弃时返回 false
    fn claim(&self) -> bool {
        self.state
            .compare_exchange(
                WRITE_PENDING,
                WRITE_STARTED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// 连接写端句柄（可克隆，会话注册表与连接任务共享）
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    id: ChannelId,
    remote: SocketAddr,
    transport: TransportKind,
    outbound: mpsc::Sender<Outbound>,
    closed: CancellationToken,
}

impl fmt::Debug for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbound")
            .field("len", &self.payload.len())
            .finish()
    }
}

impl ChannelHandle {
    /// 创建句柄与写任务的接收端
    pub(crate) fn new(
        remote: SocketAddr,
        transport: TransportKind,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Outbound>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: ChannelId::next(),
            remote,
            transport,
            outbound,
            closed: CancellationToken::new(),
        };
        (handle, rx)
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.outbound.is_closed()
    }

    /// 请求关闭连接（读写两端都会退出）
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub(crate) fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// 非阻塞入队，队列满时返回 `Backpressure`
    pub fn try_send(&self, payload: Bytes) -> Result<(), ProtocolError> {
        if self.is_closed() {
            return Err(ProtocolError::ChannelClosed);
        }
        self.outbound
            .try_send(Outbound {
                payload,
                ticket: None,
            })
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => ProtocolError::Backpressure,
                mpsc::error::TrySendError::Closed(_) => ProtocolError::ChannelClosed,
            })
    }

    /// 入队并等待写任务确认写出
    ///
    /// `ChannelClosed` 与 `WriteTimedOut` 都表示报文没有写出；
    /// `Io` 与 `WriteUnconfirmed` 表示写出可能已部分或全部发生。
    pub async fn write(&self, payload: Bytes, timeout: Duration) -> Result<(), ProtocolError> {
        if self.is_closed() {
            return Err(ProtocolError::ChannelClosed);
        }
        let deadline = tokio::time::Instant::now() + timeout;
        let state = Arc::new(AtomicU8::new(WRITE_PENDING));
        let (done, mut written) = oneshot::channel();
        let outbound = Outbound {
            payload,
            ticket: Some(WriteTicket {
                state: Arc::clone(&state),
                done,
            }),
        };
        match tokio::time::timeout_at(deadline, self.outbound.send(outbound)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(ProtocolError::ChannelClosed),
            // 未能入队
            Err(_) => return Err(ProtocolError::WriteTimedOut),
        }
        match tokio::time::timeout_at(deadline, &mut written).await {
            Ok(Ok(result)) => result.map_err(ProtocolError::Io),
            // 写任务未写出就丢弃了报文
            Ok(Err(_)) => Err(ProtocolError::ChannelClosed),
            Err(_) => {
                let abandoned = state
                    .compare_exchange(
                        WRITE_PENDING,
                        WRITE_ABANDONED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok();
                if abandoned {
                    Err(ProtocolError::WriteTimedOut)
                } else {
                    Err(ProtocolError::WriteUnconfirmed)
                }
            }
        }
    }
}

/// 写任务的底层输出
#[async_trait]
pub(crate) trait FrameWriter: Send {
    async fn write_frame(&mut self, payload: &[u8]) -> io::Result<()>;

    async fn shutdown(&mut self) {}
}

/// 字节流输出（TCP 写半部）
pub(crate) struct StreamWriter<W>(pub W);

#[async_trait]
impl<W> FrameWriter for StreamWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_frame(&mut self, payload: &[u8]) -> io::Result<()> {
        self.0.write_all(payload).await?;
        self.0.flush().await
    }

    async fn shutdown(&mut self) {
        let _ = self.0.shutdown().await;
    }
}

/// 数据报输出（共享 UDP socket，按远端地址发送）
pub(crate) struct DatagramWriter {
    pub socket: Arc<UdpSocket>,
    pub remote: SocketAddr,
}

#[async_trait]
impl FrameWriter for DatagramWriter {
    async fn write_frame(&mut self, payload: &[u8]) -> io::Result<()> {
        self.socket.send_to(payload, self.remote).await.map(|_| ())
    }
}

/// 内存通道：不经过 socket，直接取出出站报文（嵌入式连接与测试使用）
pub struct MemoryChannel {
    rx: mpsc::Receiver<Outbound>,
    closed: CancellationToken,
}

impl MemoryChannel {
    pub fn open(
        remote: SocketAddr,
        transport: TransportKind,
        capacity: usize,
    ) -> (ChannelHandle, MemoryChannel) {
        let (handle, rx) = ChannelHandle::new(remote, transport, capacity);
        let closed = handle.closed_token();
        (handle, MemoryChannel { rx, closed })
    }

    /// 取出下一条报文并确认写出；连接关闭后返回 None
    pub async fn recv(&mut self) -> Option<Bytes> {
        loop {
            let received = tokio::select! {
                biased;
                _ = self.closed.cancelled() => None,
                item = self.rx.recv() => Some(item),
            };
            let Some(item) = received else {
                self.discard();
                return None;
            };
            if let Some(payload) = Self::deliver(item?) {
                return Some(payload);
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<Bytes> {
        loop {
            if self.closed.is_cancelled() {
                self.discard();
                return None;
            }
            let outbound = self.rx.try_recv().ok()?;
            if let Some(payload) = Self::deliver(outbound) {
                return Some(payload);
            }
        }
    }

    /// 已被等待方放弃的报文不交付
    fn deliver(outbound: Outbound) -> Option<Bytes> {
        if let Some(ticket) = outbound.ticket {
            if !ticket.claim() {
                return None;
            }
            let _ = ticket.done.send(Ok(()));
        }
        Some(outbound.payload)
    }

    fn discard(&mut self) {
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

/// 写任务主循环：按入队顺序写出，写失败即关闭连接。
pub(crate) async fn run_writer<W: FrameWriter>(
    mut writer: W,
    mut rx: mpsc::Receiver<Outbound>,
    closed: CancellationToken,
) {
    loop {
        let outbound = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            item = rx.recv() => match item {
                Some(outbound) => outbound,
                None => break,
            },
        };
        if closed.is_cancelled() {
            break;
        }
        if let Some(ticket) = &outbound.ticket {
            if !ticket.claim() {
                debug!(target: "gateway.protocol", "channel_write_abandoned");
                continue;
            }
        }
        let result = writer.write_frame(&outbound.payload).await;
        let failed = result.is_err();
        if let Err(err) = &result {
            debug!(target: "gateway.protocol", error = %err, "channel_write_failed");
        }
        if let Some(ticket) = outbound.ticket {
            let _ = ticket.done.send(result);
        }
        if failed {
            closed.cancel();
            break;
        }
    }
    // 未写出的报文立即丢弃，等待方收到 ChannelClosed
    rx.close();
    while rx.try_recv().is_ok() {}
    writer.shutdown().await;
}
