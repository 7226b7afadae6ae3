//! # ZION PoW - proof-of-work hashing core
//!
//! The hashers a ZION miner drives, plus the one difficulty rule they share.
//!
//! ## Backends
//!
//! ```text
//! header + nonce ─┬─ Cosmic Harmony   blake3 → XOR diffusion → φ multiply → 432 Hz mix
//!                 ├─ Yescrypt         memory-hard KDF, pooled per-thread slots
//!                 ├─ RandomX          VM pool over shared cache/dataset (feature "randomx")
//!                 └─ Autolykos        Blake2b x 9, OpenCL kernel + CPU reference
//!                           │
//!                           ▼
//!             meets_target(hash, target): BE u64(hash[0..8]) < target
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use zion_pow::{PowBackend, YescryptEngine, YescryptParams};
//!
//! let engine = YescryptEngine::new();
//! engine.init(YescryptParams::default(), 4)?;
//! let hash = engine.hash_nonce(&header, 42)?;
//! if engine.check_difficulty(&hash, target) {
//!     // submit share
//! }
//! ```
//!
//! The same operations are exported over a C ABI (see [`ffi`]) for miners
//! written in other languages.

pub mod autolykos;
pub mod backend;
pub mod config;
pub mod cosmic_harmony;
pub mod difficulty;
pub mod error;
pub mod ffi; // C-compatible FFI for Python/Node.js
pub mod hexutil;
pub mod input;
#[cfg(feature = "randomx")]
pub mod randomx;
pub mod yescrypt;

pub use autolykos::{AutolykosCpu, AutolykosGpu};
pub use backend::{Algorithm, PowBackend};
pub use config::{GpuConfig, MemoryMode, RandomXConfig, YescryptParams};
pub use cosmic_harmony::CosmicHarmony;
pub use difficulty::{meets_target, Target};
pub use error::{PowError, Result};
pub use hexutil::{bytes_to_hex, hash_from_hex, hex_to_bytes};
pub use input::NoncePlacement;
#[cfg(feature = "randomx")]
pub use randomx::{RandomXEngine, RandomXStatus};
pub use yescrypt::YescryptEngine;

/// Hash output size shared by every backend.
pub const HASH_BYTES: usize = 32;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
