//! Target comparison and nonce field helpers.
//!
//! Digests and targets are 32-byte big-endian unsigned integers. A digest
//! passes when it is numerically at or below the target.

use crate::error::MinerError;

/// Nonce size in bytes (32-bit, big-endian).
pub const NONCE_SIZE: usize = 4;

/// Target and digest width in bytes.
pub const TARGET_SIZE: usize = 32;

// =============================================================================
// Comparison
// =============================================================================

/// Returns true iff `candidate <= target` as big-endian 256-bit integers.
///
/// The first differing byte, scanning from index 0, decides.
#[inline]
pub fn passes_target(candidate: &[u8; TARGET_SIZE], target: &[u8; TARGET_SIZE]) -> bool {
    for (c, t) in candidate.iter().zip(target.iter()) {
        if c != t {
            return c < t;
        }
    }
    true
}

// =============================================================================
// Difficulty
// =============================================================================

/// Target for a given difficulty: floor((2^256 - 1) / difficulty).
///
/// Returns `None` for a difficulty of zero.
pub fn difficulty_to_target(difficulty: u64) -> Option<[u8; TARGET_SIZE]> {
    if difficulty == 0 {
        return None;
    }
    let divisor = difficulty as u128;
    let mut target = [0u8; TARGET_SIZE];
    let mut rem: u128 = 0;
    for byte in target.iter_mut() {
        // rem < divisor < 2^64, so this never exceeds 72 bits
        let cur = (rem << 8) | 0xFF;
        *byte = (cur / divisor) as u8;
        rem = cur % divisor;
    }
    Some(target)
}

/// Parse a target from 64 hex digits, with or without a `0x` prefix.
pub fn parse_target(hex_str: &str) -> Result<[u8; TARGET_SIZE], MinerError> {
    let hex_str = hex_str.trim();
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let bytes = hex::decode(hex_str)?;
    bytes.as_slice().try_into().map_err(|_| {
        MinerError::InvalidTarget(format!(
            "expected {} bytes, got {}",
            TARGET_SIZE,
            bytes.len()
        ))
    })
}

// =============================================================================
// Nonce Field
// =============================================================================

/// Write the 32-bit nonce big-endian at `offset`.
///
/// Callers guarantee `offset + NONCE_SIZE <= buf.len()`.
#[inline]
pub fn set_nonce(buf: &mut [u8], offset: usize, nonce: u32) {
    buf[offset..offset + NONCE_SIZE].copy_from_slice(&nonce.to_be_bytes());
}

/// Read the big-endian 32-bit nonce at `offset`.
pub fn get_nonce(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; NONCE_SIZE];
    bytes.copy_from_slice(&buf[offset..offset + NONCE_SIZE]);
    u32::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: [u8; 32] = [
        0x3E, 0xE5, 0x3F, 0xE1, 0xAC, 0xF3, 0x55, 0x92, 0x66, 0xD8, 0x43, 0x89, 0xCE, 0xDE, 0x99,
        0x33, 0xC6, 0x8F, 0xC5, 0x1E, 0xD0, 0xA6, 0xC7, 0x91, 0xF8, 0xF9, 0xE8, 0x9D, 0xB6, 0x23,
        0xF0, 0xF6,
    ];

    #[test]
    fn test_equal_passes() {
        assert!(passes_target(&TARGET, &TARGET));
        assert!(passes_target(&[0u8; 32], &[0u8; 32]));
        assert!(passes_target(&[0xFF; 32], &[0xFF; 32]));
    }

    #[test]
    fn test_single_byte_below_and_above() {
        for pos in 0..32 {
            let mut below = TARGET;
            below[pos] -= 1;
            assert!(passes_target(&below, &TARGET), "below at byte {}", pos);

            let mut above = TARGET;
            above[pos] += 1;
            assert!(!passes_target(&above, &TARGET), "above at byte {}", pos);
        }
    }

    #[test]
    fn test_most_significant_byte_decides() {
        let mut high = [0u8; 32];
        high[0] = 0x01;
        let mut low = [0xFF; 32];
        low[0] = 0x00;
        assert!(!passes_target(&high, &low));
        assert!(passes_target(&low, &high));
    }

    #[test]
    fn test_extremes() {
        assert!(passes_target(&[0u8; 32], &[0xFF; 32]));
        assert!(!passes_target(&[0xFF; 32], &[0u8; 32]));
        let mut one = [0u8; 32];
        one[31] = 1;
        assert!(!passes_target(&one, &[0u8; 32]));
    }

    #[test]
    fn test_difficulty_to_target() {
        assert_eq!(difficulty_to_target(0), None);
        assert_eq!(difficulty_to_target(1), Some([0xFF; 32]));

        let mut half = [0xFF; 32];
        half[0] = 0x7F;
        assert_eq!(difficulty_to_target(2), Some(half));

        let mut sixteenth = [0xFF; 32];
        sixteenth[0] = 0x0F;
        assert_eq!(difficulty_to_target(16), Some(sixteenth));

        // (2^256 - 1) / 2^63 = 2^193 - 1
        let mut expected = [0xFF; 32];
        expected[..7].fill(0x00);
        expected[7] = 0x01;
        assert_eq!(difficulty_to_target(1 << 63), Some(expected));
    }

    #[test]
    fn test_difficulty_target_monotonic() {
        let easy = difficulty_to_target(1_000).unwrap();
        let hard = difficulty_to_target(1_000_000).unwrap();
        assert!(passes_target(&hard, &easy));
        assert!(!passes_target(&easy, &hard));
    }

    #[test]
    fn test_parse_target() {
        let hex_str = hex::encode(TARGET);
        assert_eq!(parse_target(&hex_str).unwrap(), TARGET);
        assert_eq!(parse_target(&format!("0x{}", hex_str)).unwrap(), TARGET);
        assert!(matches!(parse_target("00ff"), Err(MinerError::InvalidTarget(_))));
        assert!(matches!(parse_target("zz"), Err(MinerError::Hex(_))));
    }

    #[test]
    fn test_nonce_big_endian() {
        let mut buf = vec![0xAA; 8];
        set_nonce(&mut buf, 2, 0x0102_0304);
        assert_eq!(buf, vec![0xAA, 0xAA, 0x01, 0x02, 0x03, 0x04, 0xAA, 0xAA]);
        assert_eq!(get_nonce(&buf, 2), 0x0102_0304);

        set_nonce(&mut buf, 0, 37);
        assert_eq!(&buf[..4], &[0x00, 0x00, 0x00, 0x25]);
    }
}
