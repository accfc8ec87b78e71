//! # Gateway Storage 模块
//!
//! 协议层只把存储当作"设备目录"使用：根据报文中的设备标识查找已登记的设备，
//! 或根据内部 ID 查找命令目标。设备的创建与维护在网关之外完成。
//!
//! ## 模块说明
//!
//! - [`traits`]：`DeviceDirectory` 查询接口
//! - [`error`]：存储错误类型
//! - [`connection`]：PostgreSQL 连接池
//! - [`in_memory`]：内存实现（测试与无数据库部署）
//! - [`postgres`]：PostgreSQL 实现
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use gateway_storage::{DeviceDirectory, InMemoryDeviceDirectory};
//! use domain::Device;
//!
//! let directory = InMemoryDeviceDirectory::new();
//! directory.insert(Device::new(1, "201951132031", "truck-1"))?;
//! let device = directory.find_device("201951132031").await?;
//! ```

pub mod connection;
pub mod error;
pub mod in_memory;
pub mod postgres;
pub mod traits;

pub use connection::*;
pub use error::*;
pub use traits::*;

pub use in_memory::InMemoryDeviceDirectory;
pub use postgres::PgDeviceDirectory;
