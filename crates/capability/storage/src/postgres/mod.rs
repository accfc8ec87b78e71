//! # PostgreSQL 存储实现模块
//!
//! ## 数据库模式要求
//!
//! - `devices`：设备表（id bigint, unique_id text unique, name text, disabled boolean）
//!
//! 所有 SQL 查询使用参数绑定。

pub mod device;

pub use device::*;
