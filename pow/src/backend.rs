//! Uniform hashing seam.
//!
//! Every hasher implements [`PowBackend`], so a nonce loop (benchmark, share
//! search, self-test) can be written once and pointed at any algorithm.

use serde::{Deserialize, Serialize};

use crate::difficulty;
use crate::error::Result;
use crate::input::NoncePlacement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Blake3 core + golden-ratio post-processing
    CosmicHarmony,
    /// Memory-hard KDF, pooled per-thread contexts
    Yescrypt,
    /// VM pool over a shared cache/dataset
    RandomX,
    /// Blake2b 8-round kernel (GPU, with CPU reference)
    Autolykos,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [
        Algorithm::CosmicHarmony,
        Algorithm::Yescrypt,
        Algorithm::RandomX,
        Algorithm::Autolykos,
    ];

    /// Parse algorithm from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cosmic" | "cosmic_harmony" | "cosmicharmony" | "cosmic-harmony" => {
                Some(Self::CosmicHarmony)
            }
            "yescrypt" => Some(Self::Yescrypt),
            "randomx" | "random-x" | "rx/0" | "rx0" => Some(Self::RandomX),
            "autolykos" | "autolykos2" => Some(Self::Autolykos),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CosmicHarmony => "cosmic_harmony",
            Self::Yescrypt => "yescrypt",
            Self::RandomX => "randomx",
            Self::Autolykos => "autolykos",
        }
    }

    /// Where the nonce goes in the hashed buffer.
    pub fn nonce_placement(&self) -> NoncePlacement {
        match self {
            Self::Yescrypt => NoncePlacement::Offset(crate::input::YESCRYPT_NONCE_OFFSET),
            Self::RandomX => NoncePlacement::Offset(crate::input::RANDOMX_NONCE_OFFSET),
            Self::CosmicHarmony | Self::Autolykos => NoncePlacement::Append,
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Algorithm::from_str(s).ok_or_else(|| format!("unknown algorithm: {s}"))
    }
}

impl Default for Algorithm {
    fn default() -> Self {
        Self::CosmicHarmony
    }
}

/// A hasher that a nonce loop can drive.
pub trait PowBackend: Send + Sync {
    fn algorithm(&self) -> Algorithm;

    /// Hash a fully assembled input (header with nonce already placed).
    fn hash(&self, input: &[u8]) -> Result<[u8; 32]>;

    fn check_difficulty(&self, hash: &[u8; 32], target: u64) -> bool {
        difficulty::meets_target(hash, target)
    }

    fn nonce_placement(&self) -> NoncePlacement {
        self.algorithm().nonce_placement()
    }

    /// Assemble `header` + `nonce` and hash it.
    fn hash_nonce(&self, header: &[u8], nonce: u32) -> Result<[u8; 32]> {
        let input = self.nonce_placement().apply(header, nonce);
        self.hash(&input)
    }
}
