//! 存储接口 Trait 定义
//!
//! 设计原则：
//! - 只读查询，设备由外部系统登记
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发

use crate::error::StorageError;
use async_trait::async_trait;
use domain::Device;

/// 设备目录接口
///
/// 解码器通过报文中的设备标识解析身份，命令调度器通过内部 ID 校验目标。
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// 根据报文设备标识（IMEI 等）查找设备
    async fn find_device(&self, unique_id: &str) -> Result<Option<Device>, StorageError>;

    /// 根据内部 ID 查找设备
    async fn find_device_by_id(&self, device_id: i64) -> Result<Option<Device>, StorageError>;
}
