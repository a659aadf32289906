//! Hash oracle abstraction.
//!
//! Any proof-of-work hash (Argon2id, RandomX, ...) can implement the
//! `HashAlgorithm` trait and plug into `MiningEngine`. The engine builds one
//! instance per worker thread through a `HasherFactory`, inside the thread
//! that uses it, so implementations need not be `Send` or `Sync`.

use crate::error::HasherError;

/// Abstraction over a proof-of-work hashing algorithm.
pub trait HashAlgorithm {
    /// Human-readable algorithm name (e.g. "Argon2id", "RandomX").
    fn name(&self) -> &str;

    /// Whether construction produced a usable instance.
    ///
    /// Checked once per instance before the first hash.
    fn is_valid(&self) -> bool {
        true
    }

    /// Compute the 32-byte digest of `input`.
    ///
    /// Must be deterministic across calls and across valid instances.
    fn hash(&mut self, input: &[u8]) -> Result<[u8; 32], HasherError>;
}

/// Builds a hasher for the worker with the given index.
pub type HasherFactory =
    dyn Fn(usize) -> Result<Box<dyn HashAlgorithm>, HasherError> + Send + Sync;

/// Build a hasher through `factory` and run its validity check.
pub(crate) fn build_hasher(
    factory: &HasherFactory,
    worker_id: usize,
) -> Result<Box<dyn HashAlgorithm>, HasherError> {
    let hasher = factory(worker_id)?;
    if !hasher.is_valid() {
        return Err(HasherError::Invalid);
    }
    Ok(hasher)
}
