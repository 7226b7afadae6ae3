//! Difficulty contract shared by every backend.
//!
//! A share is valid when the first 8 bytes of the 32-byte hash, read as a
//! big-endian `u64`, are strictly below the target. Cosmic Harmony, Yescrypt,
//! RandomX and Autolykos all validate through [`meets_target`], so a pool sees
//! the same acceptance rule whichever algorithm the miner selected.
//!
//! The older "N leading zero bytes" form used by the RandomX wrapper goes
//! through [`meets_leading_zero_bytes`]: the target comparison for the first
//! 8 bytes, plus a byte count for requirements that reach past them.

use serde::{Deserialize, Serialize};

/// Number of hash bytes the comparison looks at.
pub const TARGET_BYTES: usize = 8;

/// 64-bit share target. Larger is easier; `u64::MAX` accepts almost anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target(pub u64);

impl Target {
    pub const EASIEST: Target = Target(u64::MAX);

    /// Equivalent target for "at least `zero_bytes` leading zero bytes".
    ///
    /// Only the first 8 bytes take part in the comparison, so requirements
    /// beyond 8 bytes saturate at `Target(1)` (all 8 bytes zero). Use
    /// [`meets_leading_zero_bytes`] to check those exactly.
    pub fn from_leading_zero_bytes(zero_bytes: u32) -> Self {
        match zero_bytes {
            0 => Self::EASIEST,
            n if n < TARGET_BYTES as u32 => Target(1u64 << (64 - 8 * n)),
            _ => Target(1),
        }
    }

    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn is_met_by(self, hash: &[u8; 32]) -> bool {
        meets_target(hash, self.0)
    }
}

impl From<u64> for Target {
    fn from(value: u64) -> Self {
        Target(value)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

/// Leading 8 bytes of the hash as a big-endian integer.
#[inline]
pub fn hash_value(hash: &[u8; 32]) -> u64 {
    let mut head = [0u8; TARGET_BYTES];
    head.copy_from_slice(&hash[..TARGET_BYTES]);
    u64::from_be_bytes(head)
}

/// `true` if the hash value is strictly below `target`.
///
/// Reads all 8 bytes unconditionally before comparing.
#[inline]
pub fn meets_target(hash: &[u8; 32], target: u64) -> bool {
    hash_value(hash) < target
}

/// Count of zero bytes at the front of the hash. Visits all 32 bytes.
pub fn leading_zero_bytes(hash: &[u8; 32]) -> u32 {
    let (count, _) = hash.iter().fold((0u32, true), |(count, zero_run), &b| {
        let zero_run = zero_run & (b == 0);
        (count + zero_run as u32, zero_run)
    });
    count
}

/// `true` if the hash starts with at least `zero_bytes` zero bytes (0..=32).
///
/// Up to 8 bytes this is exactly the target comparison; longer requirements
/// also count the bytes past the first 8.
pub fn meets_leading_zero_bytes(hash: &[u8; 32], zero_bytes: u32) -> bool {
    let head = Target::from_leading_zero_bytes(zero_bytes).is_met_by(hash);
    let tail = zero_bytes <= TARGET_BYTES as u32 || leading_zero_bytes(hash) >= zero_bytes;
    head & tail
}

/// Share difficulty relative to the easiest target (`u64::MAX / value`).
pub fn share_difficulty(hash: &[u8; 32]) -> u64 {
    u64::MAX / hash_value(hash).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_with_prefix(prefix: &[u8]) -> [u8; 32] {
        let mut hash = [0xffu8; 32];
        hash[..prefix.len()].copy_from_slice(prefix);
        hash
    }

    #[test]
    fn test_big_endian_interpretation() {
        let hash = hash_with_prefix(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(hash_value(&hash), 0x100);
        assert!(meets_target(&hash, 0x101));
        assert!(!meets_target(&hash, 0x100), "equal is not below");
        assert!(!meets_target(&hash, 0xff));
    }

    #[test]
    fn test_trivial_max_target() {
        let mut hash = [0xffu8; 32];
        hash[7] = 0xfe;
        assert!(meets_target(&hash, u64::MAX));
        // the single all-ones prefix is the only value that fails the easiest target
        assert!(!meets_target(&[0xffu8; 32], u64::MAX));
    }

    #[test]
    fn test_zero_target_rejects_everything() {
        assert!(!meets_target(&[0u8; 32], 0));
    }

    #[test]
    fn test_leading_zero_bytes() {
        assert_eq!(leading_zero_bytes(&[0u8; 32]), 32);
        assert_eq!(leading_zero_bytes(&hash_with_prefix(&[0, 0, 1])), 2);
        assert_eq!(leading_zero_bytes(&hash_with_prefix(&[7])), 0);
    }

    #[test]
    fn test_leading_zero_conversion_matches_byte_count() {
        for n in 1..8u32 {
            let target = Target::from_leading_zero_bytes(n);
            let mut exact = [0xffu8; 32];
            exact[..n as usize].fill(0);
            assert!(target.is_met_by(&exact), "{n} zero bytes must pass");

            let mut short = [0xffu8; 32];
            short[..(n - 1) as usize].fill(0);
            short[(n - 1) as usize] = 0x01;
            assert!(!target.is_met_by(&short), "{} zero bytes must fail", n - 1);
        }
        assert_eq!(Target::from_leading_zero_bytes(0), Target::EASIEST);
        assert_eq!(Target::from_leading_zero_bytes(8), Target(1));
        assert_eq!(Target::from_leading_zero_bytes(32), Target(1));
    }

    #[test]
    fn test_leading_zero_requirement_past_eight_bytes() {
        // eight zero bytes reach Target(1) but not a nine-byte requirement
        let mut eight = [0xffu8; 32];
        eight[..8].fill(0);
        assert_eq!(leading_zero_bytes(&eight), 8);
        assert!(meets_leading_zero_bytes(&eight, 8));
        for n in 9..=32u32 {
            assert!(!meets_leading_zero_bytes(&eight, n), "8 zero bytes accepted for {n}");
        }

        for n in 9..=32u32 {
            let mut exact = [0xffu8; 32];
            exact[..n as usize].fill(0);
            assert!(meets_leading_zero_bytes(&exact, n), "{n} zero bytes must pass {n}");
            if n < 32 {
                assert!(!meets_leading_zero_bytes(&exact, n + 1), "{n} zero bytes must fail n+1");
            }
        }
        assert!(meets_leading_zero_bytes(&[0u8; 32], 32));
    }

    #[test]
    fn test_leading_zero_requirement_up_to_eight_matches_target() {
        let prefixes: [&[u8]; 4] = [&[], &[0], &[0, 0, 0, 1], &[0, 0, 0, 0, 0, 0, 0, 0, 1]];
        for n in 0..=8u32 {
            for prefix in prefixes {
                let hash = hash_with_prefix(prefix);
                assert_eq!(
                    meets_leading_zero_bytes(&hash, n),
                    Target::from_leading_zero_bytes(n).is_met_by(&hash),
                    "n={n} prefix={prefix:?}"
                );
            }
        }
    }

    #[test]
    fn test_monotonic_in_target() {
        let hash = hash_with_prefix(&[0x00, 0x12, 0x34]);
        let targets = [0u64, 1, 0x0012_3400_0000_0000, 0x0012_34ff_ffff_ffff, 0x0100_0000_0000_0000, u64::MAX];
        let mut met = false;
        for t in targets {
            let now = meets_target(&hash, t);
            assert!(!met || now, "once met, an easier target must also pass");
            met = now;
        }
        assert!(met);
    }

    #[test]
    fn test_share_difficulty() {
        assert_eq!(share_difficulty(&[0u8; 32]), u64::MAX);
        assert_eq!(share_difficulty(&[0xffu8; 32]), 1);
    }

    #[test]
    fn test_target_display() {
        assert_eq!(Target(0xff).to_string(), "0x00000000000000ff");
    }
}
