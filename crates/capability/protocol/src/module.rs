//! 协议模块接口
//!
//! 一个协议模块是一组声明：名称、支持的命令、传输方式、流水线形状，
//! 以及解码器工厂与编码器。框架负责监听、分帧、会话和写通道。

use crate::codec::{ProtocolDecoder, ProtocolEncoder};
use crate::error::EncodeError;
use crate::pipeline::{ConnectionPipeline, PipelineSpec};
use crate::types::{ConnectionPolicy, TransportKind};
use bytes::Bytes;
use domain::{Command, CommandType, Device};

pub trait ProtocolModule: Send + Sync + 'static {
    /// 协议名（小写，配置与注册表的键）
    fn name(&self) -> &'static str;

    /// 声明支持的命令类型
    fn supported_commands(&self) -> &'static [CommandType];

    fn transports(&self) -> &'static [TransportKind];

    fn pipeline(&self) -> PipelineSpec;

    /// 新连接的解码器实例
    fn new_decoder(&self) -> Box<dyn ProtocolDecoder>;

    fn encoder(&self) -> &dyn ProtocolEncoder;

    fn policy(&self) -> ConnectionPolicy {
        ConnectionPolicy::default()
    }

    fn supports(&self, kind: CommandType) -> bool {
        self.supported_commands().contains(&kind)
    }

    fn assemble(&self) -> ConnectionPipeline {
        self.pipeline().assemble(self.new_decoder())
    }

    /// 校验命令类型后编码为线上字节
    fn encode_command(&self, command: &Command, device: &Device) -> Result<Bytes, EncodeError> {
        if !self.supports(command.kind) {
            return Err(EncodeError::Unsupported {
                protocol: self.name(),
                kind: command.kind,
            });
        }
        let message = self.encoder().encode(command, device)?;
        Ok(self.pipeline().encode_message(message))
    }
}
