//! 数据库连接管理
//!
//! 设备目录只做点查，连接池保持较小规模；获取连接设置超时，
//! 避免数据库不可用时解码任务长时间挂起。

use crate::error::StorageError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// 设备目录连接池上限。
pub const DIRECTORY_MAX_CONNECTIONS: u32 = 4;

/// 获取连接的超时。
pub const DIRECTORY_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(3);

/// 建立 Postgres 连接池
pub async fn connect_pool(database_url: &str) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(DIRECTORY_MAX_CONNECTIONS)
        .acquire_timeout(DIRECTORY_ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;
    Ok(pool)
}
