use std::io;
use thiserror::Error;

use super::PageId;

/// Errors from the disk manager
#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("out of disk space: no run of {0} free pages")]
    OutOfSpace(usize),

    #[error("invalid page id: {0}")]
    InvalidPageId(PageId),

    #[error("page {0} is not allocated")]
    PageNotAllocated(PageId),

    #[error("file entry already exists: {0}")]
    DuplicateFileEntry(String),

    #[error("file entry not found: {0}")]
    FileEntryNotFound(String),
}

pub type FileResult<T> = Result<T, FileError>;

/// Errors from the buffer pool
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("file error: {0}")]
    File(#[from] FileError),

    #[error("page {0} is already pinned")]
    AlreadyPinned(PageId),

    #[error("page {0} is not pinned")]
    NotPinned(PageId),

    #[error("all {0} frames are pinned")]
    PoolExhausted(usize),

    #[error("cannot free page {0} while it is pinned")]
    PinnedFree(PageId),
}

pub type PoolResult<T> = Result<T, PoolError>;
