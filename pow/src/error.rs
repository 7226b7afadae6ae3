//! Error types shared by every hashing backend.
//!
//! The C ABI cannot carry a Rust error across the boundary, so each variant
//! also has a stable negative return code (see [`PowError::code`]).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PowError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PowError {
    /// Hash requested before a successful `init()` or after `cleanup()`
    #[error("{engine} not initialized - call init first")]
    NotInitialized { engine: &'static str },

    /// Thread/VM slot outside `[0, slots)`
    #[error("invalid slot {slot} (engine has {slots} slots)")]
    InvalidSlot { slot: usize, slots: usize },

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Cache/dataset/VM/context allocation failed even after fallbacks
    #[error("allocation failed: {0}")]
    Allocation(String),

    /// Error code reported by the underlying KDF
    #[error("KDF failed: {0}")]
    Kdf(String),

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("input too large: {len} bytes (max {max})")]
    InputTooLarge { len: usize, max: usize },

    #[error("GPU error: {0}")]
    Gpu(String),
}

impl PowError {
    /// Return code used by the exported C functions.
    pub fn code(&self) -> i32 {
        match self {
            Self::NotInitialized { .. } => -1,
            Self::InvalidSlot { .. } => -2,
            Self::InvalidParams(_) => -3,
            Self::InvalidHex(_) => -4,
            Self::Kdf(_) => -5,
            Self::Allocation(_) => -6,
            Self::InputTooLarge { .. } => -7,
            Self::Gpu(_) => -8,
        }
    }
}

impl From<hex::FromHexError> for PowError {
    fn from(err: hex::FromHexError) -> Self {
        Self::InvalidHex(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_negative_and_distinct() {
        let errors = [
            PowError::NotInitialized { engine: "yescrypt" },
            PowError::InvalidSlot { slot: 9, slots: 4 },
            PowError::InvalidParams("n".into()),
            PowError::InvalidHex("odd".into()),
            PowError::Kdf("x".into()),
            PowError::Allocation("cache".into()),
            PowError::InputTooLarge { len: 300, max: 192 },
            PowError::Gpu("no device".into()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.code()).collect();
        assert!(codes.iter().all(|&c| c < 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_display_mentions_slot_bounds() {
        let err = PowError::InvalidSlot { slot: 7, slots: 2 };
        assert_eq!(err.to_string(), "invalid slot 7 (engine has 2 slots)");
    }
}
