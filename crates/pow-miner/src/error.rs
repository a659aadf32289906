//! Miner error types.

use thiserror::Error;

/// Failures surfaced synchronously to the caller.
#[derive(Debug, Error)]
pub enum MinerError {
    #[error("nonce field at offset {offset} does not fit in a {len}-byte input")]
    NonceOutOfBounds { offset: usize, len: usize },

    #[error("thread count must be at least 1")]
    ZeroThreads,

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("hasher error: {0}")]
    Hasher(#[from] HasherError),
}

/// Failures of a single hash oracle instance.
///
/// These never cross the engine boundary as panics: the affected worker
/// records the error and exits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HasherError {
    #[error("failed to allocate {bytes} bytes of scratch memory")]
    OutOfMemory { bytes: usize },

    #[error("invalid hasher parameters: {0}")]
    InvalidParams(String),

    #[error("hasher instance failed validation")]
    Invalid,

    #[error("{0}")]
    Backend(String),
}
