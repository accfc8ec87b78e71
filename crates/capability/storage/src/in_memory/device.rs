//! 设备目录内存实现
//!
//! 功能：
//! - 按设备标识与内部 ID 双索引查找
//! - 启动时由配置种子填充

use crate::error::StorageError;
use crate::traits::DeviceDirectory;
use domain::Device;
use std::collections::HashMap;
use std::sync::RwLock;

/// 设备目录内存存储
///
/// 使用 RwLock + HashMap 提供线程安全的内存存储。
pub struct InMemoryDeviceDirectory {
    devices: RwLock<HashMap<i64, Device>>,
}

impl InMemoryDeviceDirectory {
    /// 创建空目录
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
        }
    }

    /// 从 (unique_id, id) 种子构造，设备名默认为 unique_id
    pub fn from_seeds<I>(seeds: I) -> Self
    where
        I: IntoIterator<Item = (String, i64)>,
    {
        let devices = seeds
            .into_iter()
            .map(|(unique_id, id)| (id, Device::new(id, unique_id.clone(), unique_id)))
            .collect();
        Self {
            devices: RwLock::new(devices),
        }
    }

    /// 登记设备（同 ID 覆盖；unique_id 被其他设备占用时拒绝）
    pub fn insert(&self, device: Device) -> Result<(), StorageError> {
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let taken = map
            .values()
            .any(|item| item.unique_id == device.unique_id && item.id != device.id);
        if taken {
            return Err(StorageError::DuplicateUniqueId(device.unique_id));
        }
        map.insert(device.id, device);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.devices.read().map(|map| map.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryDeviceDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DeviceDirectory for InMemoryDeviceDirectory {
    async fn find_device(&self, unique_id: &str) -> Result<Option<Device>, StorageError> {
        let map = self
            .devices
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(map.values().find(|item| item.unique_id == unique_id).cloned())
    }

    async fn find_device_by_id(&self, device_id: i64) -> Result<Option<Device>, StorageError> {
        let map = self
            .devices
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(map.get(&device_id).cloned())
    }
}
