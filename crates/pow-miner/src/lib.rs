//! Proof-of-work mining library.
//!
//! Provides the multi-threaded nonce search engine, big-endian target
//! comparison, and the `HashAlgorithm` trait with the bundled memory-hard
//! hashers the engine drives.

pub mod argon2id;
pub mod error;
pub mod hashrate;
pub mod miner;
pub mod mining;
#[cfg(feature = "randomx")]
pub mod randomx;
pub mod target;

pub use error::{HasherError, MinerError};
pub use miner::{MinerEvent, MiningEngine, MiningJob, SessionStatus, Solution};
pub use mining::HashAlgorithm;
pub use target::passes_target;
