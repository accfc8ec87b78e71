//! 连接与传输相关类型定义

use std::fmt;
use std::time::Duration;

/// 传输方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// 面向连接的字节流
    Tcp,
    /// 数据报；同一远端地址视为一个逻辑连接
    Udp,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Tcp => "tcp",
            TransportKind::Udp => "udp",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 连接错误处理策略（协议模块给出默认值，可被配置覆盖）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionPolicy {
    /// 报文设备未知 / 停用时是否关闭连接
    pub close_on_unknown_device: bool,
    /// 连续解码失败达到该次数后关闭连接，0 表示从不关闭
    pub max_decode_failures: u32,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            close_on_unknown_device: true,
            max_decode_failures: 0,
        }
    }
}

impl ConnectionPolicy {
    pub fn with_overrides(mut self, overrides: PolicyOverrides) -> Self {
        if let Some(close) = overrides.close_on_unknown_device {
            self.close_on_unknown_device = close;
        }
        if let Some(max) = overrides.max_decode_failures {
            self.max_decode_failures = max;
        }
        self
    }
}

/// 部署级策略覆盖
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyOverrides {
    pub close_on_unknown_device: Option<bool>,
    pub max_decode_failures: Option<u32>,
}

/// 连接资源限制
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    /// 无入站数据超过该时长即关闭连接
    pub idle_timeout: Duration,
    /// 每连接出站队列容量
    pub outbound_queue: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(600),
            outbound_queue: 64,
        }
    }
}
