//! Header + nonce layout.
//!
//! Every backend hashes `header` with a 32-bit little-endian nonce placed
//! either after the header or at a fixed offset inside it.

use serde::{Deserialize, Serialize};

/// Nonce offset in the 80-byte Yescrypt header (76 byte payload + nonce).
pub const YESCRYPT_NONCE_OFFSET: usize = 76;
/// Nonce offset the RandomX sample/bench buffer varies.
pub const RANDOMX_NONCE_OFFSET: usize = 38;
/// Bytes in a little-endian nonce.
pub const NONCE_BYTES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoncePlacement {
    /// `header || nonce_le`
    Append,
    /// Overwrite `header[offset..offset + 4]` with `nonce_le`
    Offset(usize),
}

impl NoncePlacement {
    /// Build the hash input for one nonce.
    pub fn apply(self, header: &[u8], nonce: u32) -> Vec<u8> {
        let mut buf = match self {
            NoncePlacement::Append => Vec::with_capacity(header.len() + NONCE_BYTES),
            NoncePlacement::Offset(offset) => {
                Vec::with_capacity(header.len().max(offset + NONCE_BYTES))
            }
        };
        buf.extend_from_slice(header);
        self.write_into(&mut buf, header.len(), nonce);
        buf
    }

    /// Rewrite the nonce in a buffer previously produced by [`apply`](Self::apply)
    /// for a header of `header_len` bytes. Lets a search loop reuse one buffer.
    pub fn write_into(self, buf: &mut Vec<u8>, header_len: usize, nonce: u32) {
        let offset = match self {
            NoncePlacement::Append => header_len,
            NoncePlacement::Offset(offset) => offset,
        };
        let end = offset + NONCE_BYTES;
        if buf.len() < end {
            buf.resize(end, 0);
        }
        buf[offset..end].copy_from_slice(&nonce.to_le_bytes());
    }
}

impl Default for NoncePlacement {
    fn default() -> Self {
        NoncePlacement::Append
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append() {
        let out = NoncePlacement::Append.apply(b"abc", 0x0403_0201);
        assert_eq!(out, b"abc\x01\x02\x03\x04");
    }

    #[test]
    fn test_offset_inside_header() {
        let header = [0xaau8; 80];
        let out = NoncePlacement::Offset(YESCRYPT_NONCE_OFFSET).apply(&header, 7);
        assert_eq!(out.len(), 80);
        assert_eq!(&out[76..], &[7, 0, 0, 0]);
        assert!(out[..76].iter().all(|&b| b == 0xaa));
    }

    #[test]
    fn test_offset_past_end_zero_fills() {
        let out = NoncePlacement::Offset(6).apply(b"ab", 0xffff_ffff);
        assert_eq!(out, vec![b'a', b'b', 0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_write_into_reuses_buffer() {
        let placement = NoncePlacement::Append;
        let mut buf = placement.apply(b"hdr", 1);
        placement.write_into(&mut buf, 3, 2);
        assert_eq!(buf, placement.apply(b"hdr", 2));
    }
}
