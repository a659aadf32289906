//! RandomX hash oracle (light mode).
//!
//! Each instance owns a 256MB RandomX cache and a VM built on it. Cache or VM
//! allocation failures surface as `HasherError`s so the owning worker can
//! report them instead of aborting.

use crate::error::HasherError;
use crate::mining::HashAlgorithm;
use randomx_rs::{RandomXCache, RandomXFlag, RandomXVM};

/// RandomX light-mode hasher keyed by a seed.
pub struct RandomXHasher {
    vm: RandomXVM,
}

impl RandomXHasher {
    pub fn new(key: &[u8]) -> Result<Self, HasherError> {
        let flags = RandomXFlag::get_recommended_flags();
        let cache = RandomXCache::new(flags, key)
            .map_err(|e| HasherError::Backend(format!("cache init failed: {:?}", e)))?;
        let vm = RandomXVM::new(flags, Some(cache), None)
            .map_err(|e| HasherError::Backend(format!("VM init failed: {:?}", e)))?;
        Ok(Self { vm })
    }
}

impl HashAlgorithm for RandomXHasher {
    fn name(&self) -> &str {
        "RandomX"
    }

    fn hash(&mut self, input: &[u8]) -> Result<[u8; 32], HasherError> {
        let digest = self
            .vm
            .calculate_hash(input)
            .map_err(|e| HasherError::Backend(format!("{:?}", e)))?;
        digest
            .as_slice()
            .try_into()
            .map_err(|_| HasherError::Backend(format!("unexpected digest length {}", digest.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Cache initialization takes seconds and 256MB per instance.
    #[test]
    #[ignore]
    fn test_randomx_is_deterministic() {
        let mut a = RandomXHasher::new(b"test key 000").unwrap();
        let mut b = RandomXHasher::new(b"test key 000").unwrap();
        let input = b"This is a test";
        assert_eq!(a.hash(input).unwrap(), b.hash(input).unwrap());
        assert_eq!(a.name(), "RandomX");
    }

    #[test]
    #[ignore]
    fn test_randomx_known_vector() {
        // Reference vector from the RandomX test suite.
        let mut hasher = RandomXHasher::new(b"test key 000").unwrap();
        let digest = hasher.hash(b"This is a test").unwrap();
        assert_eq!(
            hex::encode(digest),
            "639183aae1bf4c9a35884cb46b09cad9175f04efd7684e7262a0ac1c2f0b4e3f"
        );
    }
}
