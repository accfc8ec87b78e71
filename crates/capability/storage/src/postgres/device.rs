//! Postgres 设备目录实现
//!
//! `disabled` 列映射为 `Device::enabled` 的取反。

use crate::error::StorageError;
use crate::traits::DeviceDirectory;
use domain::Device;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

pub struct PgDeviceDirectory {
    pub pool: PgPool,
}

impl PgDeviceDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }
}

fn device_from_row(row: PgRow) -> Result<Device, StorageError> {
    let disabled: Option<bool> = row.try_get("disabled")?;
    Ok(Device {
        id: row.try_get("id")?,
        unique_id: row.try_get("unique_id")?,
        name: row.try_get("name")?,
        enabled: !disabled.unwrap_or(false),
    })
}

#[async_trait::async_trait]
impl DeviceDirectory for PgDeviceDirectory {
    async fn find_device(&self, unique_id: &str) -> Result<Option<Device>, StorageError> {
        let row = sqlx::query(
            "select id, unique_id, name, disabled from devices where unique_id = $1",
        )
        .bind(unique_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(device_from_row).transpose()
    }

    async fn find_device_by_id(&self, device_id: i64) -> Result<Option<Device>, StorageError> {
        let row = sqlx::query("select id, unique_id, name, disabled from devices where id = $1")
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(device_from_row).transpose()
    }
}
