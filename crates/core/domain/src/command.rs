//! 规范命令模型
//!
//! 命令类型是所有协议共享的封闭枚举，各协议模块只声明自己支持的子集。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// 自定义命令的原始内容。
pub const KEY_DATA: &str = "data";
/// 周期上报间隔（秒）。
pub const KEY_FREQUENCY: &str = "frequency";
/// 时区。
pub const KEY_TIMEZONE: &str = "timezone";
/// 输出口编号。
pub const KEY_INDEX: &str = "index";

/// 命令类型（封闭枚举）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandType {
    Custom,
    EngineResume,
    EngineStop,
    PositionSingle,
    PositionPeriodic,
    PositionStop,
    RebootDevice,
    SetTimezone,
    OutputControl,
    AlarmArm,
    AlarmDisarm,
}

impl CommandType {
    pub const ALL: [CommandType; 11] = [
        Self::Custom,
        Self::EngineResume,
        Self::EngineStop,
        Self::PositionSingle,
        Self::PositionPeriodic,
        Self::PositionStop,
        Self::RebootDevice,
        Self::SetTimezone,
        Self::OutputControl,
        Self::AlarmArm,
        Self::AlarmDisarm,
    ];

    /// 对外（HTTP / 日志）使用的名称。
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::EngineResume => "engineResume",
            Self::EngineStop => "engineStop",
            Self::PositionSingle => "positionSingle",
            Self::PositionPeriodic => "positionPeriodic",
            Self::PositionStop => "positionStop",
            Self::RebootDevice => "rebootDevice",
            Self::SetTimezone => "setTimezone",
            Self::OutputControl => "outputControl",
            Self::AlarmArm => "alarmArm",
            Self::AlarmDisarm => "alarmDisarm",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 未知命令类型名称。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommandType(pub String);

impl fmt::Display for UnknownCommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown command type: {}", self.0)
    }
}

impl std::error::Error for UnknownCommandType {}

impl FromStr for CommandType {
    type Err = UnknownCommandType;

    /// 接受 camelCase 与 SCREAMING_SNAKE_CASE 两种写法。
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        CommandType::ALL
            .into_iter()
            .find(|kind| kind.as_str().to_ascii_lowercase() == normalized)
            .ok_or_else(|| UnknownCommandType(value.to_string()))
    }
}

/// 下发给设备的命令。
///
/// 由外部调用方创建，调度器只消费一次，创建后不再修改。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub device_id: i64,
    pub kind: CommandType,
    pub attributes: BTreeMap<String, String>,
}

impl Command {
    pub fn new(device_id: i64, kind: CommandType) -> Self {
        Self {
            device_id,
            kind,
            attributes: BTreeMap::new(),
        }
    }

    /// 追加参数（构造期使用）。
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}
