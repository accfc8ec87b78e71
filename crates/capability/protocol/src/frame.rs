//! 分帧规则
//!
//! 把连接上的连续字节流切分为离散帧。`FrameSplitter` 实现
//! `tokio_util::codec::Decoder`，跨读取保留不完整尾部，读到完整帧即产出。
//!
//! 支持的规则：
//! - 分隔符（帧包含分隔符本身）
//! - 固定长度
//! - 长度前缀（大端，带偏移与长度修正）
//! - 起止标记（起始标记前的垃圾字节被丢弃）

use crate::error::FrameError;
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// 长度字段宽度（大端）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthWidth {
    One,
    Two,
    Four,
}

impl LengthWidth {
    pub fn bytes(&self) -> usize {
        match self {
            LengthWidth::One => 1,
            LengthWidth::Two => 2,
            LengthWidth::Four => 4,
        }
    }

    fn read(&self, src: &[u8]) -> i64 {
        match self {
            LengthWidth::One => src[0] as i64,
            LengthWidth::Two => u16::from_be_bytes([src[0], src[1]]) as i64,
            LengthWidth::Four => u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as i64,
        }
    }
}

/// 分帧规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRule {
    /// 以分隔符结尾，`max_length` 包含分隔符
    Delimiter { delimiter: u8, max_length: usize },
    /// 固定长度帧
    FixedLength { length: usize },
    /// 帧长 = `offset + width + 长度字段值 + adjustment`
    LengthPrefixed {
        offset: usize,
        width: LengthWidth,
        adjustment: i64,
        max_length: usize,
    },
    /// 从起始标记到结束标记（均包含）
    Markers {
        start: u8,
        end: u8,
        max_length: usize,
    },
}

impl FrameRule {
    pub fn delimiter(delimiter: u8, max_length: usize) -> Self {
        FrameRule::Delimiter {
            delimiter,
            max_length,
        }
    }

    pub fn splitter(&self) -> FrameSplitter {
        FrameSplitter::new(self.clone())
    }
}

/// 按规则切分字节流的有状态分帧器（每连接一个）
#[derive(Debug, Clone)]
pub struct FrameSplitter {
    rule: FrameRule,
    // 已扫描过、确认不含结束字节的前缀长度
    scanned: usize,
}

impl FrameSplitter {
    pub fn new(rule: FrameRule) -> Self {
        Self { rule, scanned: 0 }
    }

    pub fn rule(&self) -> &FrameRule {
        &self.rule
    }

    fn take_until(
        &mut self,
        src: &mut BytesMut,
        from: usize,
        end: u8,
        max_length: usize,
    ) -> Result<Option<BytesMut>, FrameError> {
        let start = self.scanned.max(from).min(src.len());
        match src[start..].iter().position(|byte| *byte == end) {
            Some(index) => {
                let frame_len = start + index + 1;
                self.scanned = 0;
                if frame_len > max_length {
                    return Err(FrameError::TooLong { max: max_length });
                }
                Ok(Some(src.split_to(frame_len)))
            }
            None => {
                if src.len() >= max_length {
                    return Err(FrameError::TooLong { max: max_length });
                }
                self.scanned = src.len();
                Ok(None)
            }
        }
    }
}

impl Decoder for FrameSplitter {
    type Item = BytesMut;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, FrameError> {
        match self.rule.clone() {
            FrameRule::Delimiter {
                delimiter,
                max_length,
            } => self.take_until(src, 0, delimiter, max_length),
            FrameRule::FixedLength { length } => {
                if src.len() < length {
                    src.reserve(length - src.len());
                    return Ok(None);
                }
                Ok(Some(src.split_to(length)))
            }
            FrameRule::LengthPrefixed {
                offset,
                width,
                adjustment,
                max_length,
            } => {
                let header = offset + width.bytes();
                if src.len() < header {
                    return Ok(None);
                }
                let field = width.read(&src[offset..header]);
                let total = header as i64 + field + adjustment;
                if total < header as i64 {
                    return Err(FrameError::InvalidLength(field));
                }
                let total = total as usize;
                if total > max_length {
                    return Err(FrameError::TooLong { max: max_length });
                }
                if src.len() < total {
                    src.reserve(total - src.len());
                    return Ok(None);
                }
                Ok(Some(src.split_to(total)))
            }
            FrameRule::Markers {
                start,
                end,
                max_length,
            } => {
                match src.iter().position(|byte| *byte == start) {
                    Some(0) => {}
                    Some(index) => {
                        let _ = src.split_to(index);
                        self.scanned = 0;
                    }
                    None => {
                        src.clear();
                        self.scanned = 0;
                        return Ok(None);
                    }
                }
                self.take_until(src, 1, end, max_length)
            }
        }
    }

    /// 流结束时丢弃不完整的尾部片段。
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, FrameError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                src.clear();
                self.scanned = 0;
                Ok(None)
            }
        }
    }
}
