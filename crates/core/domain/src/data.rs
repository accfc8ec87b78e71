use std::collections::BTreeMap;

/// 位置属性值的数据类型。
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    I64(i64),
    F64(f64),
    Bool(bool),
    String(String),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F64(value) => Some(*value),
            Self::I64(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::I64(v) => write!(f, "{}", v),
            Self::F64(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::F64(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// 规范化后的设备定位记录。
///
/// 由解码器产出后不再修改，所有权随后交给下游（存储、实时视图）。
/// 速度单位为节，航向为度，海拔为米。
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub device_id: i64,
    pub protocol: String,
    pub device_time_ms: i64,
    pub server_time_ms: i64,
    /// 是否为有效定位；命令回执等无定位报文为 false。
    pub valid: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub course: f64,
    pub altitude: f64,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Position {
    /// 创建空定位记录（坐标为 0，无效）。
    pub fn new(device_id: i64, protocol: impl Into<String>, server_time_ms: i64) -> Self {
        Self {
            device_id,
            protocol: protocol.into(),
            device_time_ms: server_time_ms,
            server_time_ms,
            valid: false,
            latitude: 0.0,
            longitude: 0.0,
            speed: 0.0,
            course: 0.0,
            altitude: 0.0,
            attributes: BTreeMap::new(),
        }
    }

    /// 写入协议私有属性（同名覆盖）。
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }
}
