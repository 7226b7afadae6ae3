//! Autolykos-style Blake2b kernel: CPU reference, device mirror, OpenCL source
//! and the host-side GPU dispatcher.
//!
//! Per nonce:
//! ```text
//! combined = input || nonce_le            (input <= 192 bytes)
//! state    = blake2b512(combined)
//! repeat 8: state = blake2b512(state || combined)
//! output   = state[..32]
//! ```

pub mod blake2b;
pub mod gpu;
pub mod kernel;

use blake2::{Blake2b512, Digest};

use crate::backend::{Algorithm, PowBackend};
use crate::error::{PowError, Result};

pub use gpu::AutolykosGpu;
pub use kernel::{get_kernel_source, AUTOLYKOS_KERNEL, KERNEL_NAME};

pub const K_MAX_INPUT_BYTES: usize = 192;
pub const K_NONCE_BYTES: usize = 4;
pub const K_COMBINED_BYTES: usize = K_MAX_INPUT_BYTES + K_NONCE_BYTES;
pub const K_HASH_BYTES: usize = 32;
pub const K_STATE_BYTES: usize = 64;
pub const K_ROUNDS: usize = 8;

fn check_input(input: &[u8]) -> Result<()> {
    if input.len() > K_MAX_INPUT_BYTES {
        return Err(PowError::InputTooLarge {
            len: input.len(),
            max: K_MAX_INPUT_BYTES,
        });
    }
    Ok(())
}

/// Rounds over an already assembled `input || nonce_le` buffer.
fn hash_combined(combined: &[u8]) -> [u8; K_HASH_BYTES] {
    let mut state = Blake2b512::digest(combined);
    for _ in 0..K_ROUNDS {
        let mut hasher = Blake2b512::new();
        hasher.update(state);
        hasher.update(combined);
        state = hasher.finalize();
    }
    let mut out = [0u8; K_HASH_BYTES];
    out.copy_from_slice(&state[..K_HASH_BYTES]);
    out
}

fn combine(input: &[u8], nonce: u32) -> Vec<u8> {
    let mut combined = Vec::with_capacity(input.len() + K_NONCE_BYTES);
    combined.extend_from_slice(input);
    combined.extend_from_slice(&nonce.to_le_bytes());
    combined
}

/// CPU reference for one nonce.
pub fn autolykos_hash(input: &[u8], nonce: u32) -> Result<[u8; K_HASH_BYTES]> {
    check_input(input)?;
    Ok(hash_combined(&combine(input, nonce)))
}

/// CPU reference for many nonces, same output order as the kernel.
pub fn autolykos_hash_batch(input: &[u8], nonces: &[u32]) -> Result<Vec<[u8; K_HASH_BYTES]>> {
    check_input(input)?;

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        Ok(nonces
            .par_iter()
            .map(|&nonce| hash_combined(&combine(input, nonce)))
            .collect())
    }

    #[cfg(not(feature = "parallel"))]
    {
        Ok(nonces
            .iter()
            .map(|&nonce| hash_combined(&combine(input, nonce)))
            .collect())
    }
}

/// Same computation through the device Blake2b transcription.
pub fn autolykos_hash_mirror(input: &[u8], nonce: u32) -> Result<[u8; K_HASH_BYTES]> {
    check_input(input)?;
    let len = input.len();
    let mut msg = [0u8; K_STATE_BYTES + K_COMBINED_BYTES];
    msg[K_STATE_BYTES..K_STATE_BYTES + len].copy_from_slice(input);
    msg[K_STATE_BYTES + len..K_STATE_BYTES + len + K_NONCE_BYTES]
        .copy_from_slice(&nonce.to_le_bytes());
    let combined_len = len + K_NONCE_BYTES;

    let mut state = blake2b::blake2b_512(&msg[K_STATE_BYTES..K_STATE_BYTES + combined_len]);
    for _ in 0..K_ROUNDS {
        msg[..K_STATE_BYTES].copy_from_slice(&state);
        state = blake2b::blake2b_512(&msg[..K_STATE_BYTES + combined_len]);
    }

    let mut out = [0u8; K_HASH_BYTES];
    out.copy_from_slice(&state[..K_HASH_BYTES]);
    Ok(out)
}

/// [`PowBackend`] over the CPU reference; nonce is appended.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutolykosCpu;

impl PowBackend for AutolykosCpu {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Autolykos
    }

    fn hash(&self, input: &[u8]) -> Result<[u8; 32]> {
        if input.len() > K_COMBINED_BYTES {
            return Err(PowError::InputTooLarge {
                len: input.len(),
                max: K_COMBINED_BYTES,
            });
        }
        Ok(hash_combined(input))
    }

    fn hash_nonce(&self, header: &[u8], nonce: u32) -> Result<[u8; 32]> {
        autolykos_hash(header, nonce)
    }
}
