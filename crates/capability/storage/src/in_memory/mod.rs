//! 内存存储实现模块
//!
//! 用于测试以及未配置数据库时的部署（设备由配置种子提供）。

pub mod device;

pub use device::*;
