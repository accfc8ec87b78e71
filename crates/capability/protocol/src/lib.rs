//! # 协议适配框架
//!
//! 让一个网关进程同时服务多种追踪设备协议：
//! - **分帧**：按协议规则把字节流切成帧（分隔符 / 定长 / 长度前缀 / 起止标记）
//! - **编解码**：帧 → 规范位置；规范命令 → 设备报文
//! - **监听**：TCP（每连接一个任务）与 UDP（每远端地址一个逻辑连接）
//! - **会话**：设备 → 当前连接，命令下发据此路由
//!
//! ## 架构设计
//!
//! ```text
//! ProtocolRegistry (按名称登记 ProtocolModule)
//!       │  端口配置
//!       ▼
//! TcpServer / UdpServer
//!       │  每连接装配 ConnectionPipeline
//!       ▼
//! FrameSplitter → StringCodec → ProtocolDecoder ──► mpsc<Position> ──► 位置流水线
//!                                     │
//!                                     ▼
//!                              SessionRegistry ◄── 命令调度（ProtocolEncoder → ChannelHandle）
//! ```
//!
//! ## 新增协议
//!
//! 实现 [`ProtocolModule`]（名称、支持命令、传输方式、[`PipelineSpec`]、
//! 解码器工厂、编码器），并加入 [`builtin_modules`]。

mod channel;
mod codec;
mod connection;
mod error;
mod frame;
pub mod mobilogix;
mod module;
mod pipeline;
mod registry;
mod session;
mod tcp_server;
mod types;
mod udp_server;

pub use channel::{ChannelHandle, ChannelId, MemoryChannel};
pub use codec::{Message, ProtocolDecoder, ProtocolEncoder, StringCodec};
pub use connection::{Connection, ConnectionContext, ServerContext};
pub use error::{DecodeError, EncodeError, FrameError, ProtocolError};
pub use frame::{FrameRule, FrameSplitter, LengthWidth};
pub use mobilogix::MobilogixProtocol;
pub use module::ProtocolModule;
pub use pipeline::{ConnectionPipeline, PipelineSpec, Stage};
pub use registry::{builtin_modules, ProtocolRegistry, RunningServer};
pub use session::{DeviceSession, SessionError, SessionRegistry, SessionRoute, SessionSnapshot};
pub use tcp_server::TcpServer;
pub use types::*;
pub use udp_server::UdpServer;
