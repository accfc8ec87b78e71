//! 网关运行配置加载。

use std::collections::BTreeMap;
use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 网关运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    pub listen_host: String,
    /// 未配置时使用内存设备目录。
    pub database_url: Option<String>,
    /// 内存设备目录种子：unique_id → 内部 ID。
    pub seed_devices: BTreeMap<String, i64>,
    /// 协议名 → 监听端口。
    pub protocol_ports: BTreeMap<String, u16>,
    pub idle_timeout_seconds: u64,
    pub outbound_queue: usize,
    pub position_queue: usize,
    pub dispatch_timeout_ms: u64,
    pub dispatch_max_retries: u64,
    pub dispatch_backoff_ms: u64,
    /// 覆盖各协议模块默认的未知设备策略。
    pub close_on_unknown_device: Option<bool>,
    /// 覆盖各协议模块默认的连续解码失败阈值（0 表示从不因解码失败断开）。
    pub max_decode_failures: Option<u32>,
    pub position_batch_size: usize,
    pub position_dedup_cache: usize,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_addr =
            env::var("GATEWAY_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8082".to_string());
        let listen_host = env::var("GATEWAY_LISTEN_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let database_url = read_optional("GATEWAY_DATABASE_URL");
        let seed_devices = match read_optional("GATEWAY_DEVICES") {
            Some(value) => parse_device_seeds(&value)?,
            None => BTreeMap::new(),
        };
        let protocol_ports = match read_optional("GATEWAY_PROTOCOL_PORTS") {
            Some(value) => parse_protocol_ports(&value)?,
            None => BTreeMap::from([("mobilogix".to_string(), 5221)]),
        };
        let idle_timeout_seconds = read_positive_with_default("GATEWAY_IDLE_TIMEOUT_SECONDS", 600)?;
        let outbound_queue = read_positive_with_default("GATEWAY_OUTBOUND_QUEUE", 64)? as usize;
        let position_queue = read_positive_with_default("GATEWAY_POSITION_QUEUE", 4096)? as usize;
        let dispatch_timeout_ms = read_positive_with_default("GATEWAY_DISPATCH_TIMEOUT_MS", 5000)?;
        let dispatch_max_retries = read_u64_with_default("GATEWAY_DISPATCH_MAX_RETRIES", 0)?;
        let dispatch_backoff_ms = read_u64_with_default("GATEWAY_DISPATCH_BACKOFF_MS", 200)?;
        let close_on_unknown_device = read_optional_bool("GATEWAY_CLOSE_ON_UNKNOWN_DEVICE")?;
        let max_decode_failures = read_optional_u64("GATEWAY_MAX_DECODE_FAILURES")?
            .map(|value| value.min(u32::MAX as u64) as u32);
        let position_batch_size =
            read_u64_with_default("GATEWAY_POSITION_BATCH_SIZE", 50)? as usize;
        let position_dedup_cache =
            read_u64_with_default("GATEWAY_POSITION_DEDUP_CACHE", 10_000)? as usize;

        Ok(Self {
            http_addr,
            listen_host,
            database_url,
            seed_devices,
            protocol_ports,
            idle_timeout_seconds,
            outbound_queue,
            position_queue,
            dispatch_timeout_ms,
            dispatch_max_retries,
            dispatch_backoff_ms,
            close_on_unknown_device,
            max_decode_failures,
            position_batch_size,
            position_dedup_cache,
        })
    }
}

/// 解析 `name=port,name=port`。
pub fn parse_protocol_ports(value: &str) -> Result<BTreeMap<String, u16>, ConfigError> {
    let mut ports = BTreeMap::new();
    for (name, port) in parse_pairs("GATEWAY_PROTOCOL_PORTS", value)? {
        let port = port.parse::<u16>().map_err(|_| {
            ConfigError::Invalid("GATEWAY_PROTOCOL_PORTS".to_string(), value.to_string())
        })?;
        ports.insert(name.to_ascii_lowercase(), port);
    }
    Ok(ports)
}

/// 解析 `unique_id=id,unique_id=id`。
pub fn parse_device_seeds(value: &str) -> Result<BTreeMap<String, i64>, ConfigError> {
    let mut devices = BTreeMap::new();
    for (unique_id, id) in parse_pairs("GATEWAY_DEVICES", value)? {
        let id = id
            .parse::<i64>()
            .map_err(|_| ConfigError::Invalid("GATEWAY_DEVICES".to_string(), value.to_string()))?;
        devices.insert(unique_id, id);
    }
    Ok(devices)
}

fn parse_pairs(key: &str, value: &str) -> Result<Vec<(String, String)>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (left, right) = item
                .split_once('=')
                .ok_or_else(|| ConfigError::Invalid(key.to_string(), value.to_string()))?;
            let (left, right) = (left.trim(), right.trim());
            if left.is_empty() || right.is_empty() {
                return Err(ConfigError::Invalid(key.to_string(), value.to_string()));
            }
            Ok((left.to_string(), right.to_string()))
        })
        .collect()
}

/// 超时与队列容量不允许为 0。
pub fn require_positive(key: &str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(key.to_string(), "0".to_string()));
    }
    Ok(value)
}

/// 解析开关值：`1/true/on/yes` 与 `0/false/off/no`，其他取值报错。
pub fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid(key.to_string(), value.to_string())),
    }
}

fn read_positive_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    require_positive(key, read_u64_with_default(key, default)?)
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_optional_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(key.to_string(), value)),
        Err(_) => Ok(None),
    }
}

fn read_optional_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match read_optional(key) {
        Some(value) => parse_bool(key, &value).map(Some),
        None => Ok(None),
    }
}
