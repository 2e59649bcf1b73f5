use thiserror::Error;

use crate::file::PoolError;
use crate::page::PageError;

/// Errors from hash index operations
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("buffer pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("page error: {0}")]
    Page(#[from] PageError),

    #[error("data entry of {0} bytes exceeds the bucket page limit")]
    EntryTooLarge(usize),

    #[error("entry not found")]
    NotFound,

    #[error("corrupted index structure")]
    Corrupted,
}

pub type IndexResult<T> = Result<T, IndexError>;
