use thiserror::Error;

use super::types::BlockId;

/// Storage engine error types
#[derive(Error, Debug)]
pub enum BasaltError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no buffer became available within the wait bound")]
    BufferPoolExhausted,

    #[error("could not acquire lock on {0} within the wait bound")]
    LockTimeout(BlockId),

    #[error("block {0} is not pinned by this transaction")]
    BlockNotPinned(BlockId),

    #[error("block {0} would skip over an uncreated chunk file")]
    ChunkOutOfOrder(BlockId),

    #[error("write of {len} bytes at offset {offset} exceeds page size {page_size}")]
    PageOverflow {
        offset: usize,
        len: usize,
        page_size: usize,
    },

    #[error("log record is corrupt: {0}")]
    LogCorrupt(String),
}

pub type Result<T> = std::result::Result<T, BasaltError>;
