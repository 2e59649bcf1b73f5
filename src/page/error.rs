use thiserror::Error;

/// Errors from slotted-page operations
#[derive(Debug, Error)]
pub enum PageError {
    #[error("no space left on page")]
    SpaceExhausted,

    #[error("invalid rid: slot {0}")]
    InvalidRid(u16),

    #[error("update size mismatch: expected {expected}, got {actual}")]
    InvalidUpdate { expected: usize, actual: usize },
}

pub type PageResult<T> = Result<T, PageError>;
