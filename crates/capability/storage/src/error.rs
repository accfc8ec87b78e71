//! 设备目录错误类型

/// 存储错误。
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unique_id already registered: {0}")]
    DuplicateUniqueId(String),
    #[error("directory lock poisoned")]
    LockPoisoned,
}
