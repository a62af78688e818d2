use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("sync error: {0}")]
    Sync(#[from] keepsake_sync::SyncError),

    #[error("store is not attached to a persistence engine")]
    NotAttached,
}

pub type PersistResult<T> = Result<T, PersistError>;
