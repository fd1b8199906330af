use thiserror::Error;

use super::types::PageId;

/// Storage engine error types.
///
/// Capacity and precondition outcomes are ordinary return values
/// (`Ok(None)` / `Ok(false)`); only conditions that leave in-memory state
/// untrustworthy travel this channel.
#[derive(Error, Debug)]
pub enum EmberError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Buffer pool exhausted, every frame is pinned")]
    PoolExhausted,

    #[error("Disk scheduler error: {0}")]
    Scheduler(String),

    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),
}

pub type Result<T> = std::result::Result<T, EmberError>;
