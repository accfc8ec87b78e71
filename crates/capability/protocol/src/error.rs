//! 协议错误类型定义
//!
//! 按处理结果分层：
//! - [`FrameError`]：分帧失败，字节流已不可信，连接关闭
//! - [`DecodeError`]：单帧解码失败，按连接策略丢弃或关闭
//! - [`EncodeError`]：命令无法编码，调度方收到失败
//! - [`ProtocolError`]：连接级 / 监听级错误

use domain::CommandType;

/// 分帧错误
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// 帧超过最大长度
    #[error("frame exceeds max length {max} bytes")]
    TooLong { max: usize },

    /// 长度字段非法（计算出的帧长小于头部）
    #[error("invalid length field: {0}")]
    InvalidLength(i64),

    /// IO 错误（codec::Decoder 约束要求）
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 单帧解码错误
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// 报文格式错误
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// 设备标识未登记
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    /// 设备已停用
    #[error("device disabled: {0}")]
    DeviceDisabled(String),

    /// 报文不携带标识且连接上尚未识别设备
    #[error("connection has no identified device")]
    Unidentified,

    /// 设备目录查询失败
    #[error("device directory error: {0}")]
    Directory(String),

    /// 连接级错误（应答背压、通道关闭），连接必须关闭
    #[error(transparent)]
    Connection(#[from] ProtocolError),
}

impl DecodeError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// 身份类错误（未知 / 停用 / 未识别）
    pub fn is_identity(&self) -> bool {
        matches!(
            self,
            Self::UnknownDevice(_) | Self::DeviceDisabled(_) | Self::Unidentified
        )
    }
}

/// 命令编码错误
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// 协议未声明该命令类型
    #[error("command type {kind} is not supported by protocol {protocol}")]
    Unsupported {
        protocol: &'static str,
        kind: CommandType,
    },

    /// 缺少必填参数
    #[error("missing command parameter: {0}")]
    MissingParameter(&'static str),

    /// 参数值无法编码
    #[error("invalid command parameter {key}: {reason}")]
    InvalidParameter { key: &'static str, reason: String },
}

/// 协议通信错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 分帧错误
    #[error("framing error: {0}")]
    Framing(#[from] FrameError),

    /// 配置错误（协议名未知、重复注册等）
    #[error("config error: {0}")]
    Config(String),

    /// 出站队列已满
    #[error("outbound queue full")]
    Backpressure,

    /// 通道已关闭
    #[error("channel closed")]
    ChannelClosed,

    /// 写出时限已到，报文确认未写出
    #[error("write timed out before the frame was written")]
    WriteTimedOut,

    /// 写出时限已到，报文已开始写出但未确认
    #[error("write started but not confirmed before the deadline")]
    WriteUnconfirmed,

    /// 未知设备且策略要求关闭
    #[error("unidentified device rejected: {0}")]
    DeviceRejected(String),

    /// 连续解码失败超过阈值
    #[error("too many consecutive decode failures: {0}")]
    TooManyFailures(u32),

    /// 下游位置通道已关闭
    #[error("position sink closed")]
    SinkClosed,
}
