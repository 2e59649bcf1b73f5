use thiserror::Error;

use crate::file::{PageId, PoolError};
use crate::page::PageError;

/// Errors from heap file operations
#[derive(Debug, Error)]
pub enum HeapError {
    #[error("buffer pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("page error: {0}")]
    Page(#[from] PageError),

    #[error("record of {0} bytes exceeds the data page capacity")]
    RecordTooLarge(usize),

    #[error("data page {0} has no directory entry")]
    MissingDirEntry(PageId),
}

pub type HeapResult<T> = Result<T, HeapError>;
