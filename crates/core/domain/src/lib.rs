pub mod command;
pub mod data;

pub use command::{Command, CommandType, UnknownCommandType};
pub use data::{AttributeValue, Position};

/// 设备身份记录：协议层只查询，不创建。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// 内部数值 ID（会话与命令均以此为键）。
    pub id: i64,
    /// 报文中携带的设备标识（IMEI 等）。
    pub unique_id: String,
    pub name: String,
    pub enabled: bool,
}

impl Device {
    /// 构造启用状态的设备记录。
    pub fn new(id: i64, unique_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            unique_id: unique_id.into(),
            name: name.into(),
            enabled: true,
        }
    }

    /// 构造停用的副本。
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// 当前时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
