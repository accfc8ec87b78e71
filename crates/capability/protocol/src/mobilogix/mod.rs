//! Mobilogix 协议
//!
//! 文本协议，以 `]` 分帧（单帧最长 1024 字节），UTF-8，TCP。
//!
//! ## 报文
//!
//! ```text
//! 简报：  ID123,37.7,-122.4,55[,course[,altitude]]]
//! 登录：  [2024-05-01 08:00:00,T1,1,V1.2,201951132031]          → [time,S1,1]
//! 定位：  [time,T<n>,index,firmware,imei,status,power,sat,lat,lon,kph,course] → [time,S<n>]
//! 回执：  [time,R<code>,imei,result]
//! 命令：  [time,S<code>,imei[,payload]]
//! ```

mod decoder;
mod encoder;

pub use decoder::MobilogixDecoder;
pub use encoder::MobilogixEncoder;

use crate::codec::{ProtocolDecoder, ProtocolEncoder, StringCodec};
use crate::frame::FrameRule;
use crate::module::ProtocolModule;
use crate::pipeline::PipelineSpec;
use crate::types::{ConnectionPolicy, TransportKind};
use domain::CommandType;

pub const PROTOCOL_NAME: &str = "mobilogix";
pub const MAX_FRAME_LENGTH: usize = 1024;

/// 命令编号（下行 `S<n>`，设备回执 `R<n>`）
pub(crate) const CODE_CUSTOM: u32 = 30;
pub(crate) const CODE_POSITION_SINGLE: u32 = 32;
pub(crate) const CODE_REBOOT: u32 = 39;
pub(crate) const CODE_ENGINE: u32 = 41;

const SUPPORTED_COMMANDS: &[CommandType] = &[
    CommandType::Custom,
    CommandType::EngineResume,
    CommandType::EngineStop,
    CommandType::PositionSingle,
    CommandType::RebootDevice,
];

const TRANSPORTS: &[TransportKind] = &[TransportKind::Tcp];

#[derive(Debug, Default)]
pub struct MobilogixProtocol {
    encoder: MobilogixEncoder,
}

impl MobilogixProtocol {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProtocolModule for MobilogixProtocol {
    fn name(&self) -> &'static str {
        PROTOCOL_NAME
    }

    fn supported_commands(&self) -> &'static [CommandType] {
        SUPPORTED_COMMANDS
    }

    fn transports(&self) -> &'static [TransportKind] {
        TRANSPORTS
    }

    fn pipeline(&self) -> PipelineSpec {
        PipelineSpec::new(FrameRule::delimiter(b']', MAX_FRAME_LENGTH))
            .with_string_codec(StringCodec::Utf8)
    }

    fn new_decoder(&self) -> Box<dyn ProtocolDecoder> {
        Box::new(MobilogixDecoder::new())
    }

    fn encoder(&self) -> &dyn ProtocolEncoder {
        &self.encoder
    }

    fn policy(&self) -> ConnectionPolicy {
        ConnectionPolicy {
            close_on_unknown_device: true,
            max_decode_failures: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EncodeError;
    use domain::{Command, Device};

    #[test]
    fn declares_supported_commands() {
        let protocol = MobilogixProtocol::new();
        assert!(protocol.supports(CommandType::RebootDevice));
        assert!(!protocol.supports(CommandType::AlarmArm));
        assert_eq!(protocol.transports(), &[TransportKind::Tcp]);
    }

    #[test]
    fn undeclared_command_emits_no_bytes() {
        let protocol = MobilogixProtocol::new();
        let device = Device::new(1, "201951132031", "truck");
        let command = Command::new(1, CommandType::SetTimezone);
        match protocol.encode_command(&command, &device) {
            Err(EncodeError::Unsupported { protocol, kind }) => {
                assert_eq!(protocol, PROTOCOL_NAME);
                assert_eq!(kind, CommandType::SetTimezone);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn encode_command_produces_wire_bytes() {
        let protocol = MobilogixProtocol::new();
        let device = Device::new(1, "201951132031", "truck");
        let bytes = protocol
            .encode_command(&Command::new(1, CommandType::RebootDevice), &device)
            .expect("encode");
        let text = std::str::from_utf8(&bytes).expect("utf8");
        assert!(text.starts_with('['));
        assert!(text.ends_with(",S39,201951132031]"));
    }
}
