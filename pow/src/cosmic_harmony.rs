//! ZION Cosmic Harmony hasher
//!
//! Stages:
//! 1. Blake3 over `input || nonce_le`
//! 2. Split the 32-byte digest into 8x u32 words (little-endian)
//! 3. XOR diffusion across all words
//! 4. Golden ratio multiplication (φ = 0x9E3779B9)
//! 5. Sacred-frequency modulation (432 Hz constant, rotated per word)
//!
//! Stages 3-5 are the network-defined post-processing. They are versioned by
//! [`COSMIC_HARMONY_VERSION`]; any change to them is a consensus change.
//!
//! SIMD: the blake3 crate dispatches SSE4.1/AVX2/AVX-512/NEON at runtime and
//! every path yields the same digest. [`initialize`] only probes and logs the
//! level that will be used.

use once_cell::sync::OnceCell;

use crate::backend::{Algorithm, PowBackend};
use crate::difficulty;
use crate::error::Result;

/// Post-processing revision implemented by this module.
pub const COSMIC_HARMONY_VERSION: u32 = 1;

/// Golden ratio constant (φ * 2^32)
const PHI: u32 = 0x9E37_79B9;

/// Sacred frequency (Hz)
const SACRED_FREQUENCY: u32 = 432;

static SIMD_LEVEL: OnceCell<SimdLevel> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SimdLevel {
    Portable,
    Sse41,
    Avx2,
    Avx512,
    Neon,
}

impl SimdLevel {
    /// Best vector extension the blake3 backend can use on this CPU.
    pub fn detect() -> Self {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            if is_x86_feature_detected!("avx512f") && is_x86_feature_detected!("avx512vl") {
                return SimdLevel::Avx512;
            }
            if is_x86_feature_detected!("avx2") {
                return SimdLevel::Avx2;
            }
            if is_x86_feature_detected!("sse4.1") {
                return SimdLevel::Sse41;
            }
        }
        if cfg!(target_arch = "aarch64") {
            return SimdLevel::Neon;
        }
        SimdLevel::Portable
    }

    pub fn name(&self) -> &'static str {
        match self {
            SimdLevel::Portable => "portable",
            SimdLevel::Sse41 => "SSE4.1",
            SimdLevel::Avx2 => "AVX2",
            SimdLevel::Avx512 => "AVX-512",
            SimdLevel::Neon => "NEON",
        }
    }
}

/// Probe CPU features once per process.
///
/// Always succeeds: a missing AVX-512 unit only means a narrower SIMD path.
pub fn initialize() -> bool {
    SIMD_LEVEL.get_or_init(|| {
        let level = SimdLevel::detect();
        log::info!(
            "🌌 Cosmic Harmony v{} initialized (blake3 SIMD: {})",
            COSMIC_HARMONY_VERSION,
            level.name()
        );
        level
    });
    true
}

pub fn is_initialized() -> bool {
    SIMD_LEVEL.get().is_some()
}

/// SIMD level picked by [`initialize`], if it has run.
pub fn simd_level() -> Option<SimdLevel> {
    SIMD_LEVEL.get().copied()
}

/// XOR diffusion, golden multiply and frequency modulation over the digest.
fn post_process(digest: &[u8; 32]) -> [u8; 32] {
    let mut state = [0u32; 8];
    for (word, chunk) in state.iter_mut().zip(digest.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }

    let xor_mix = state.iter().fold(0u32, |acc, &w| acc ^ w);
    for word in state.iter_mut() {
        *word ^= xor_mix;
    }

    for word in state.iter_mut() {
        *word = word.wrapping_mul(PHI);
    }

    for (i, word) in state.iter_mut().enumerate() {
        *word ^= SACRED_FREQUENCY.rotate_left(4 * i as u32);
    }

    let mut output = [0u8; 32];
    for (chunk, word) in output.chunks_exact_mut(4).zip(state.iter()) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    output
}

/// Hash `input || nonce_le`. Pure; safe from any number of threads.
pub fn cosmic_hash(input: &[u8], nonce: u32) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(input);
    hasher.update(&nonce.to_le_bytes());
    post_process(hasher.finalize().as_bytes())
}

/// Hash a buffer that already carries its nonce.
pub fn cosmic_hash_raw(input: &[u8]) -> [u8; 32] {
    post_process(blake3::hash(input).as_bytes())
}

/// Shared difficulty contract (big-endian leading u64 < target).
pub fn check_difficulty(hash: &[u8; 32], target_difficulty: u64) -> bool {
    difficulty::meets_target(hash, target_difficulty)
}

/// Scan `max_iterations` nonces from `start_nonce` (wrapping) for a share.
pub fn find_nonce(
    header: &[u8],
    start_nonce: u32,
    max_iterations: u64,
    target: u64,
) -> Option<(u32, [u8; 32])> {
    let mut nonce = start_nonce;
    for _ in 0..max_iterations {
        let hash = cosmic_hash(header, nonce);
        if check_difficulty(&hash, target) {
            return Some((nonce, hash));
        }
        nonce = nonce.wrapping_add(1);
    }
    None
}

/// Hashes for `count` consecutive nonces starting at `start_nonce`.
#[cfg(feature = "parallel")]
pub fn hash_batch(header: &[u8], start_nonce: u32, count: u32) -> Vec<[u8; 32]> {
    use rayon::prelude::*;

    (0..count)
        .into_par_iter()
        .map(|i| cosmic_hash(header, start_nonce.wrapping_add(i)))
        .collect()
}

/// Hashes for `count` consecutive nonces starting at `start_nonce`.
#[cfg(not(feature = "parallel"))]
pub fn hash_batch(header: &[u8], start_nonce: u32, count: u32) -> Vec<[u8; 32]> {
    (0..count)
        .map(|i| cosmic_hash(header, start_nonce.wrapping_add(i)))
        .collect()
}

/// [`PowBackend`] adapter; nonce is appended to the header.
#[derive(Debug, Clone, Copy)]
pub struct CosmicHarmony;

impl CosmicHarmony {
    pub fn new() -> Self {
        initialize();
        CosmicHarmony
    }
}

impl Default for CosmicHarmony {
    fn default() -> Self {
        Self::new()
    }
}

impl PowBackend for CosmicHarmony {
    fn algorithm(&self) -> Algorithm {
        Algorithm::CosmicHarmony
    }

    fn hash(&self, input: &[u8]) -> Result<[u8; 32]> {
        Ok(cosmic_hash_raw(input))
    }

    fn hash_nonce(&self, header: &[u8], nonce: u32) -> Result<[u8; 32]> {
        Ok(cosmic_hash(header, nonce))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize() {
        assert!(initialize());
        assert!(initialize());
        assert!(is_initialized());
        assert!(simd_level().is_some());
    }

    #[test]
    fn test_deterministic() {
        let a = cosmic_hash(b"", 0);
        let b = cosmic_hash(b"", 0);
        assert_eq!(a, b);
        assert_ne!(a, [0u8; 32]);
    }

    #[test]
    fn test_nonce_changes_hash() {
        let header = b"ZION block header";
        assert_ne!(cosmic_hash(header, 0), cosmic_hash(header, 1));
    }

    #[test]
    fn test_raw_matches_appended_nonce() {
        let header = b"header bytes";
        let mut buf = header.to_vec();
        buf.extend_from_slice(&42u32.to_le_bytes());
        assert_eq!(cosmic_hash_raw(&buf), cosmic_hash(header, 42));
    }

    #[test]
    fn test_post_process_not_identity() {
        let digest = *blake3::hash(b"x").as_bytes();
        assert_ne!(post_process(&digest), digest);
    }

    #[test]
    fn test_backend_adapter() {
        let backend = CosmicHarmony::new();
        assert_eq!(backend.algorithm(), Algorithm::CosmicHarmony);
        let via_trait = backend.hash_nonce(b"hdr", 9).unwrap();
        assert_eq!(via_trait, cosmic_hash(b"hdr", 9));
        let assembled = backend.nonce_placement().apply(b"hdr", 9);
        assert_eq!(backend.hash(&assembled).unwrap(), via_trait);
    }

    #[test]
    fn test_find_nonce_trivial_target() {
        let (nonce, hash) = find_nonce(b"block", 100, 10, u64::MAX).unwrap();
        assert_eq!(hash, cosmic_hash(b"block", nonce));
        assert!(check_difficulty(&hash, u64::MAX));
    }

    #[test]
    fn test_find_nonce_impossible_target() {
        assert!(find_nonce(b"block", 0, 64, 0).is_none());
    }

    #[test]
    fn test_find_nonce_moderate_target() {
        // 1 in 256 hashes pass
        let target = 1u64 << 56;
        let (nonce, hash) = find_nonce(b"moderate", 0, 1 << 16, target).unwrap();
        assert!(difficulty::hash_value(&hash) < target);
        for earlier in 0..nonce {
            assert!(!check_difficulty(&cosmic_hash(b"moderate", earlier), target));
        }
    }

    #[test]
    fn test_find_nonce_wraps() {
        let found = find_nonce(b"wrap", u32::MAX, 2, u64::MAX).unwrap();
        assert_eq!(found.0, u32::MAX);
    }

    #[test]
    fn test_hash_batch_matches_sequential() {
        let batch = hash_batch(b"batch", u32::MAX - 1, 4);
        assert_eq!(batch.len(), 4);
        for (i, h) in batch.iter().enumerate() {
            assert_eq!(*h, cosmic_hash(b"batch", (u32::MAX - 1).wrapping_add(i as u32)));
        }
    }
}
