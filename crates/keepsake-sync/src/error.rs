use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("storage error: {0}")]
    Storage(#[from] keepsake_storage::StorageError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type SyncResult<T> = Result<T, SyncError>;
