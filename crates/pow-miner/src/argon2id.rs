//! Argon2id hash oracle.
//!
//! Each instance owns its Argon2 scratch memory, reserved once at
//! construction and reused for every hash. Construction fails cleanly when
//! the reservation cannot be satisfied.

use crate::error::HasherError;
use crate::mining::HashAlgorithm;
use ::argon2::{Algorithm, Argon2, Block, Params, Version};

/// Minimum salt length accepted by Argon2.
pub const MIN_SALT_LEN: usize = 8;

/// Argon2 memory block size in bytes.
const BLOCK_SIZE: usize = 1024;

/// Argon2id parameters shared by every worker's hasher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argon2Config {
    /// Scratch memory per instance, in KiB (at least 8).
    pub memory_kib: u32,
    /// Number of passes over the scratch memory.
    pub iterations: u32,
    /// Fixed salt mixed into every hash.
    pub salt: Vec<u8>,
}

impl Default for Argon2Config {
    fn default() -> Self {
        Self {
            memory_kib: 2048,
            iterations: 1,
            salt: b"pow-miner/argon2id".to_vec(),
        }
    }
}

/// Argon2id hasher with a private scratch buffer.
pub struct Argon2Hasher {
    ctx: Argon2<'static>,
    salt: Vec<u8>,
    memory: Vec<Block>,
    blocks: usize,
}

impl Argon2Hasher {
    pub fn new(config: &Argon2Config) -> Result<Self, HasherError> {
        if config.salt.len() < MIN_SALT_LEN {
            return Err(HasherError::InvalidParams(format!(
                "salt must be at least {} bytes, got {}",
                MIN_SALT_LEN,
                config.salt.len()
            )));
        }
        let params = Params::new(config.memory_kib, config.iterations, 1, Some(32))
            .map_err(|e| HasherError::InvalidParams(e.to_string()))?;

        let blocks = params.block_count();
        let mut memory = Vec::new();
        memory
            .try_reserve_exact(blocks)
            .map_err(|_| HasherError::OutOfMemory {
                bytes: blocks.saturating_mul(BLOCK_SIZE),
            })?;
        memory.resize(blocks, Block::default());

        Ok(Self {
            ctx: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            salt: config.salt.clone(),
            memory,
            blocks,
        })
    }
}

impl HashAlgorithm for Argon2Hasher {
    fn name(&self) -> &str {
        "Argon2id"
    }

    fn is_valid(&self) -> bool {
        self.blocks > 0 && self.memory.len() == self.blocks
    }

    fn hash(&mut self, input: &[u8]) -> Result<[u8; 32], HasherError> {
        let mut output = [0u8; 32];
        self.ctx
            .hash_password_into_with_memory(input, &self.salt, &mut output, &mut self.memory)
            .map_err(|e| HasherError::Backend(e.to_string()))?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> Argon2Config {
        Argon2Config {
            memory_kib: 8,
            iterations: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_argon2_is_deterministic() {
        let mut hasher = Argon2Hasher::new(&light()).unwrap();
        assert!(hasher.is_valid());
        let input = [0x03, 0x05, 0x07, 0x09].repeat(16);
        let first = hasher.hash(&input).unwrap();
        let second = hasher.hash(&input).unwrap();
        assert_eq!(first, second);

        let mut other = Argon2Hasher::new(&light()).unwrap();
        assert_eq!(other.hash(&input).unwrap(), first);
    }

    #[test]
    fn test_argon2_different_inputs() {
        let mut hasher = Argon2Hasher::new(&light()).unwrap();
        let a = hasher.hash(b"input A long enough for a block header").unwrap();
        let b = hasher.hash(b"input B long enough for a block header").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_argon2_salt_changes_digest() {
        let mut plain = Argon2Hasher::new(&light()).unwrap();
        let mut salted = Argon2Hasher::new(&Argon2Config {
            salt: b"another-salt".to_vec(),
            ..light()
        })
        .unwrap();
        assert_ne!(plain.hash(b"header").unwrap(), salted.hash(b"header").unwrap());
    }

    #[test]
    fn test_argon2_rejects_short_salt() {
        let config = Argon2Config {
            salt: b"short".to_vec(),
            ..light()
        };
        assert!(matches!(
            Argon2Hasher::new(&config),
            Err(HasherError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_argon2_rejects_bad_params() {
        let too_small = Argon2Config {
            memory_kib: 1,
            ..light()
        };
        assert!(matches!(
            Argon2Hasher::new(&too_small),
            Err(HasherError::InvalidParams(_))
        ));

        let no_passes = Argon2Config {
            iterations: 0,
            ..light()
        };
        assert!(matches!(
            Argon2Hasher::new(&no_passes),
            Err(HasherError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_argon2_name() {
        let hasher = Argon2Hasher::new(&light()).unwrap();
        assert_eq!(hasher.name(), "Argon2id");
    }
}
