//! 连接处理流水线
//!
//! 协议模块声明 [`PipelineSpec`]，每个新连接据此装配独立的
//! [`ConnectionPipeline`]：分帧器 → 字符串解码 → 协议解码；
//! 出站方向为协议编码 → 字符串编码。

use crate::codec::{Message, ProtocolDecoder, StringCodec};
use crate::error::{DecodeError, FrameError};
use crate::frame::{FrameRule, FrameSplitter};
use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

/// 流水线阶段（按入站、出站顺序）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Framer(FrameRule),
    StringDecoder(StringCodec),
    ProtocolDecoder,
    ProtocolEncoder,
    StringEncoder(StringCodec),
}

/// 协议模块声明的流水线形状
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSpec {
    frame_rule: FrameRule,
    string_codec: Option<StringCodec>,
}

impl PipelineSpec {
    pub fn new(frame_rule: FrameRule) -> Self {
        Self {
            frame_rule,
            string_codec: None,
        }
    }

    pub fn with_string_codec(mut self, codec: StringCodec) -> Self {
        self.string_codec = Some(codec);
        self
    }

    pub fn frame_rule(&self) -> &FrameRule {
        &self.frame_rule
    }

    pub fn string_codec(&self) -> Option<StringCodec> {
        self.string_codec
    }

    pub fn stages(&self) -> Vec<Stage> {
        let mut stages = vec![Stage::Framer(self.frame_rule.clone())];
        if let Some(codec) = self.string_codec {
            stages.push(Stage::StringDecoder(codec));
        }
        stages.push(Stage::ProtocolDecoder);
        stages.push(Stage::ProtocolEncoder);
        if let Some(codec) = self.string_codec {
            stages.push(Stage::StringEncoder(codec));
        }
        stages
    }

    /// 出站方向：文本经字符串编码，字节原样输出
    pub fn encode_message(&self, message: Message) -> Bytes {
        match (message, self.string_codec) {
            (Message::Text(text), Some(codec)) => codec.encode(&text),
            (Message::Text(text), None) => Bytes::from(text.into_bytes()),
            (Message::Binary(bytes), _) => bytes,
        }
    }

    /// 为新连接装配独立的流水线实例
    pub fn assemble(&self, decoder: Box<dyn ProtocolDecoder>) -> ConnectionPipeline {
        ConnectionPipeline {
            splitter: self.frame_rule.splitter(),
            string_codec: self.string_codec,
            decoder,
        }
    }
}

/// 单连接的流水线实例（分帧状态与解码器状态均不跨连接共享）
pub struct ConnectionPipeline {
    splitter: FrameSplitter,
    string_codec: Option<StringCodec>,
    pub(crate) decoder: Box<dyn ProtocolDecoder>,
}

impl ConnectionPipeline {
    pub fn split(&mut self, buffer: &mut BytesMut) -> Result<Option<BytesMut>, FrameError> {
        self.splitter.decode(buffer)
    }

    pub fn to_message(&self, frame: BytesMut) -> Result<Message, DecodeError> {
        match self.string_codec {
            Some(codec) => codec.decode(frame).map(Message::Text),
            None => Ok(Message::Binary(frame.freeze())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_follow_declaration() {
        let spec = PipelineSpec::new(FrameRule::delimiter(b']', 1024))
            .with_string_codec(StringCodec::Utf8);
        assert_eq!(
            spec.stages(),
            vec![
                Stage::Framer(FrameRule::delimiter(b']', 1024)),
                Stage::StringDecoder(StringCodec::Utf8),
                Stage::ProtocolDecoder,
                Stage::ProtocolEncoder,
                Stage::StringEncoder(StringCodec::Utf8),
            ]
        );

        let binary = PipelineSpec::new(FrameRule::FixedLength { length: 8 });
        assert_eq!(binary.stages().len(), 3);
        assert_eq!(
            binary.encode_message(Message::text("ok")),
            Bytes::from_static(b"ok")
        );
    }
}
