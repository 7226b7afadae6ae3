//! OpenCL kernel for the Autolykos-style hash
//!
//! One work-item per nonce:
//! `state = blake2b(input || nonce_le)`, then 8x `state = blake2b(state || input || nonce_le)`,
//! output = first 32 bytes of the final state.

/// Entry point name inside [`AUTOLYKOS_KERNEL`].
pub const KERNEL_NAME: &str = "autolykos_kernel";

/// OpenCL kernel source code
pub const AUTOLYKOS_KERNEL: &str = r#"
// ============================================================================
// ZION AUTOLYKOS - OpenCL kernel
// ============================================================================
// Args: inputs (shared prefix, <= 192 bytes), input_len, nonces[count],
//       outputs[count * 32], count
// ============================================================================

#define K_MAX_INPUT_BYTES 192
#define K_NONCE_BYTES 4
#define K_COMBINED_BYTES (K_MAX_INPUT_BYTES + K_NONCE_BYTES)
#define K_HASH_BYTES 32
#define K_STATE_BYTES 64
#define K_ROUNDS 8
#define BLAKE2B_BLOCK_BYTES 128

__constant ulong BLAKE2B_IV[8] = {
    0x6a09e667f3bcc908UL, 0xbb67ae8584caa73bUL,
    0x3c6ef372fe94f82bUL, 0xa54ff53a5f1d36f1UL,
    0x510e527fade682d1UL, 0x9b05688c2b3e6c1fUL,
    0x1f83d9abfb41bd6bUL, 0x5be0cd19137e2179UL
};

__constant uchar BLAKE2B_SIGMA[12][16] = {
    {  0,  1,  2,  3,  4,  5,  6,  7,  8,  9, 10, 11, 12, 13, 14, 15 },
    { 14, 10,  4,  8,  9, 15, 13,  6,  1, 12,  0,  2, 11,  7,  5,  3 },
    { 11,  8, 12,  0,  5,  2, 15, 13, 10, 14,  3,  6,  7,  1,  9,  4 },
    {  7,  9,  3,  1, 13, 12, 11, 14,  2,  6,  5, 10,  4,  0, 15,  8 },
    {  9,  0,  5,  7,  2,  4, 10, 15, 14,  1, 11, 12,  6,  8,  3, 13 },
    {  2, 12,  6, 10,  0, 11,  8,  3,  4, 13,  7,  5, 15, 14,  1,  9 },
    { 12,  5,  1, 15, 14, 13,  4, 10,  0,  7,  6,  3,  9,  2,  8, 11 },
    { 13, 11,  7, 14, 12,  1,  3,  9,  5,  0, 15,  4,  8,  6,  2, 10 },
    {  6, 15, 14,  9, 11,  3,  0,  8, 12,  2, 13,  7,  1,  4, 10,  5 },
    { 10,  2,  8,  4,  7,  6,  1,  5, 15, 11,  9, 14,  3, 12, 13,  0 },
    {  0,  1,  2,  3,  4,  5,  6,  7,  8,  9, 10, 11, 12, 13, 14, 15 },
    { 14, 10,  4,  8,  9, 15, 13,  6,  1, 12,  0,  2, 11,  7,  5,  3 }
};

inline ulong rotr64(ulong x, uint n) {
    return (x >> n) | (x << (64 - n));
}

#define G(a, b, c, d, x, y)              \
    do {                                 \
        a = a + b + (x);                 \
        d = rotr64(d ^ a, 32);           \
        c = c + d;                       \
        b = rotr64(b ^ c, 24);           \
        a = a + b + (y);                 \
        d = rotr64(d ^ a, 16);           \
        c = c + d;                       \
        b = rotr64(b ^ c, 63);           \
    } while (0)

inline ulong load64_le(const uchar* p) {
    ulong w = 0;
    #pragma unroll
    for (int i = 7; i >= 0; i--) {
        w = (w << 8) | (ulong)p[i];
    }
    return w;
}

inline void store64_le(uchar* p, ulong w) {
    #pragma unroll
    for (int i = 0; i < 8; i++) {
        p[i] = (uchar)(w >> (8 * i));
    }
}

void blake2b_compress(ulong* h, const uchar* block, ulong t, int last) {
    ulong m[16];
    ulong v[16];

    for (int i = 0; i < 16; i++) {
        m[i] = load64_le(block + 8 * i);
    }
    for (int i = 0; i < 8; i++) {
        v[i] = h[i];
        v[i + 8] = BLAKE2B_IV[i];
    }
    v[12] ^= t;
    if (last) {
        v[14] = ~v[14];
    }

    for (int r = 0; r < 12; r++) {
        G(v[0], v[4], v[8],  v[12], m[BLAKE2B_SIGMA[r][0]],  m[BLAKE2B_SIGMA[r][1]]);
        G(v[1], v[5], v[9],  v[13], m[BLAKE2B_SIGMA[r][2]],  m[BLAKE2B_SIGMA[r][3]]);
        G(v[2], v[6], v[10], v[14], m[BLAKE2B_SIGMA[r][4]],  m[BLAKE2B_SIGMA[r][5]]);
        G(v[3], v[7], v[11], v[15], m[BLAKE2B_SIGMA[r][6]],  m[BLAKE2B_SIGMA[r][7]]);
        G(v[0], v[5], v[10], v[15], m[BLAKE2B_SIGMA[r][8]],  m[BLAKE2B_SIGMA[r][9]]);
        G(v[1], v[6], v[11], v[12], m[BLAKE2B_SIGMA[r][10]], m[BLAKE2B_SIGMA[r][11]]);
        G(v[2], v[7], v[8],  v[13], m[BLAKE2B_SIGMA[r][12]], m[BLAKE2B_SIGMA[r][13]]);
        G(v[3], v[4], v[9],  v[14], m[BLAKE2B_SIGMA[r][14]], m[BLAKE2B_SIGMA[r][15]]);
    }

    for (int i = 0; i < 8; i++) {
        h[i] ^= v[i] ^ v[i + 8];
    }
}

// Unkeyed Blake2b-512 over a private buffer
void blake2b_512(const uchar* msg, uint len, uchar* out) {
    ulong h[8];
    uchar block[BLAKE2B_BLOCK_BYTES];
    uint offset = 0;
    ulong t = 0;

    for (int i = 0; i < 8; i++) {
        h[i] = BLAKE2B_IV[i];
    }
    h[0] ^= 0x01010040UL;

    while (len - offset > BLAKE2B_BLOCK_BYTES) {
        for (int i = 0; i < BLAKE2B_BLOCK_BYTES; i++) {
            block[i] = msg[offset + i];
        }
        t += BLAKE2B_BLOCK_BYTES;
        blake2b_compress(h, block, t, 0);
        offset += BLAKE2B_BLOCK_BYTES;
    }

    uint rem = len - offset;
    for (uint i = 0; i < BLAKE2B_BLOCK_BYTES; i++) {
        block[i] = (i < rem) ? msg[offset + i] : 0;
    }
    t += rem;
    blake2b_compress(h, block, t, 1);

    for (int i = 0; i < 8; i++) {
        store64_le(out + 8 * i, h[i]);
    }
}

__kernel void autolykos_kernel(
    __global const uchar* inputs,
    uint input_len,
    __global const uint* nonces,
    __global uchar* outputs,
    uint count
) {
    uint gid = get_global_id(0);
    if (gid >= count) {
        return;
    }

    uint len = min(input_len, (uint)K_MAX_INPUT_BYTES);

    // [0, 64): state, [64, 64 + combined_len): input || nonce_le
    uchar msg[K_STATE_BYTES + K_COMBINED_BYTES];
    uchar state[K_STATE_BYTES];

    for (uint i = 0; i < len; i++) {
        msg[K_STATE_BYTES + i] = inputs[i];
    }
    uint nonce = nonces[gid];
    for (uint i = 0; i < K_NONCE_BYTES; i++) {
        msg[K_STATE_BYTES + len + i] = (uchar)(nonce >> (8 * i));
    }
    uint combined_len = len + K_NONCE_BYTES;

    blake2b_512(msg + K_STATE_BYTES, combined_len, state);

    for (int round = 0; round < K_ROUNDS; round++) {
        for (int i = 0; i < K_STATE_BYTES; i++) {
            msg[i] = state[i];
        }
        blake2b_512(msg, K_STATE_BYTES + combined_len, state);
    }

    __global uchar* out = outputs + (size_t)gid * K_HASH_BYTES;
    for (int i = 0; i < K_HASH_BYTES; i++) {
        out[i] = state[i];
    }
}
"#;

/// Kernel source for `Program::create_and_build_from_source`.
pub fn get_kernel_source() -> &'static str {
    AUTOLYKOS_KERNEL
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autolykos::{blake2b, K_HASH_BYTES, K_MAX_INPUT_BYTES, K_NONCE_BYTES, K_ROUNDS, K_STATE_BYTES};

    #[test]
    fn test_kernel_has_entry_point() {
        let src = get_kernel_source();
        assert!(src.contains(&format!("__kernel void {KERNEL_NAME}(")));
        assert!(src.contains("__global const uint* nonces"));
    }

    #[test]
    fn test_kernel_constants_match_host() {
        let src = get_kernel_source();
        assert!(src.contains(&format!("#define K_MAX_INPUT_BYTES {K_MAX_INPUT_BYTES}\n")));
        assert!(src.contains(&format!("#define K_NONCE_BYTES {K_NONCE_BYTES}\n")));
        assert!(src.contains(&format!("#define K_HASH_BYTES {K_HASH_BYTES}\n")));
        assert!(src.contains(&format!("#define K_STATE_BYTES {K_STATE_BYTES}\n")));
        assert!(src.contains(&format!("#define K_ROUNDS {K_ROUNDS}\n")));
    }

    #[test]
    fn test_kernel_iv_matches_mirror() {
        let src = get_kernel_source();
        for word in blake2b::IV {
            assert!(src.contains(&format!("0x{word:016x}UL")), "IV word {word:016x} missing");
        }
    }

    #[test]
    fn test_kernel_sigma_matches_mirror() {
        let src = get_kernel_source();
        for row in blake2b::SIGMA.iter() {
            let line = row
                .iter()
                .map(|n| format!("{n:>2}"))
                .collect::<Vec<_>>()
                .join(", ");
            assert!(src.contains(&format!("{{ {line} }}")), "sigma row missing: {line}");
        }
    }

    #[test]
    fn test_balanced_braces() {
        let src = get_kernel_source();
        let open = src.matches('{').count();
        let close = src.matches('}').count();
        assert_eq!(open, close);
    }
}
