//! Hex helpers for callers that only pass ASCII strings across the ABI.

use crate::error::{PowError, Result};

/// Lowercase hex encoding.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Strict hex decoding: odd lengths and non-hex characters are errors.
pub fn hex_to_bytes(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.len() % 2 != 0 {
        return Err(PowError::InvalidHex(format!("odd length {}", s.len())));
    }
    Ok(hex::decode(s)?)
}

/// Decode exactly one 32-byte hash.
pub fn hash_from_hex(s: &str) -> Result<[u8; 32]> {
    let bytes = hex_to_bytes(s)?;
    bytes.as_slice().try_into().map_err(|_| {
        PowError::InvalidHex(format!("expected 32 bytes, got {}", bytes.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_hex_roundtrip() {
        let mut hash = [0u8; 32];
        for (i, b) in hash.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(37);
        }
        let s = bytes_to_hex(&hash);
        assert_eq!(s.len(), 64);
        assert_eq!(s, s.to_lowercase());
        assert_eq!(hash_from_hex(&s).unwrap(), hash);
    }

    #[test]
    fn test_rejects_odd_length() {
        assert!(matches!(hex_to_bytes("abc"), Err(PowError::InvalidHex(_))));
    }

    #[test]
    fn test_rejects_non_hex() {
        assert!(matches!(hex_to_bytes("zz"), Err(PowError::InvalidHex(_))));
    }

    #[test]
    fn test_accepts_prefix_and_uppercase() {
        assert_eq!(hex_to_bytes("0xDEADbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(hex_to_bytes("").unwrap().is_empty());
    }

    #[test]
    fn test_hash_from_hex_wrong_len() {
        assert!(hash_from_hex("00ff").is_err());
    }
}
