//! 帧内容与协议编解码接口

use crate::connection::ConnectionContext;
use crate::error::{DecodeError, EncodeError};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use domain::{Command, Device, Position};

/// 流水线中传递的帧内容：字符串阶段之前为字节，之后为文本。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Binary(Bytes),
    Text(String),
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Message::Text(text.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(text) => Some(text),
            Message::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Text(text) => text.as_bytes(),
            Message::Binary(bytes) => bytes,
        }
    }
}

/// 文本协议的字符集
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringCodec {
    /// 严格 UTF-8，非法序列视为报文错误
    Utf8,
    /// 单字节透传（ISO-8859-1）
    Latin1,
}

impl StringCodec {
    pub fn decode(&self, frame: BytesMut) -> Result<String, DecodeError> {
        match self {
            StringCodec::Utf8 => String::from_utf8(frame.to_vec())
                .map_err(|e| DecodeError::malformed(format!("invalid utf-8: {e}"))),
            StringCodec::Latin1 => Ok(frame.iter().map(|byte| *byte as char).collect()),
        }
    }

    pub fn encode(&self, text: &str) -> Bytes {
        match self {
            StringCodec::Utf8 => Bytes::copy_from_slice(text.as_bytes()),
            StringCodec::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }
}

/// 协议解码器：每连接一个实例，可以持有连接级状态。
///
/// 一帧可以产出零到多个位置；需要应答的协议通过 `ctx.reply` 回写。
#[async_trait]
pub trait ProtocolDecoder: Send {
    async fn decode(
        &mut self,
        ctx: &mut ConnectionContext,
        message: Message,
    ) -> Result<Vec<Position>, DecodeError>;
}

/// 协议编码器：把规范命令转成设备报文，无连接状态。
pub trait ProtocolEncoder: Send + Sync {
    fn encode(&self, command: &Command, device: &Device) -> Result<Message, EncodeError>;
}
