//! C-compatible FFI interface for the ZION PoW hashers
//!
//! Exported symbols keep the names the native mining libraries have always
//! used, so existing ctypes/cffi callers load this cdylib unchanged:
//! - Cosmic Harmony: `cosmic_harmony_initialize`, `cosmic_hash`, `check_difficulty`
//! - Yescrypt: `zion_yescrypt_*`, `yescrypt_*`
//! - RandomX: `randomx_init`, `zion_randomx_*` (feature `randomx`)
//! - Autolykos: `autolykos_hash_batch_cpu`
//!
//! Every function runs behind a panic guard and reports failures through its
//! return value. Negative `i32` codes come from [`PowError::code`].
//!
//! # Example (Python)
//! ```python
//! import ctypes
//!
//! lib = ctypes.CDLL("libzion_pow.so")
//! lib.zion_yescrypt_init(4096, 8, 1, 4)
//! out = (ctypes.c_uint8 * 32)()
//! lib.zion_yescrypt_hash_auto(b"Hello ZION", 10, out)
//! ```

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::slice;

use crate::autolykos::{self, K_HASH_BYTES};
use crate::config::YescryptParams;
use crate::cosmic_harmony;
use crate::difficulty;
use crate::error::PowError;
use crate::hexutil;
use crate::yescrypt;

/// Version of the FFI interface
pub const FFI_VERSION: u32 = 1;

const YESCRYPT_VERSION_C: &str = concat!("ZION Yescrypt v", env!("CARGO_PKG_VERSION"), "\0");
#[cfg(feature = "randomx")]
const RANDOMX_VERSION_C: &str = concat!(
    "ZION RandomX ",
    env!("CARGO_PKG_VERSION"),
    " (Multi-threaded)\0"
);

fn guard<T>(fallback: T, f: impl FnOnce() -> T) -> T {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        log::error!("panic caught at FFI boundary");
        fallback
    })
}

/// Input slice; a zero length accepts any pointer, including null.
unsafe fn input<'a>(ptr: *const u8, len: usize) -> Option<&'a [u8]> {
    if len == 0 {
        Some(&[])
    } else if ptr.is_null() {
        None
    } else {
        Some(slice::from_raw_parts(ptr, len))
    }
}

unsafe fn hash_ref<'a>(ptr: *const u8) -> Option<&'a [u8; 32]> {
    (ptr as *const [u8; 32]).as_ref()
}

unsafe fn write_hash(output: *mut u8, hash: &[u8; 32]) {
    slice::from_raw_parts_mut(output, 32).copy_from_slice(hash);
}

/// Write `s` plus a NUL terminator. Caller provides `s.len() + 1` bytes.
unsafe fn write_c_string(out: *mut c_char, s: &str) {
    let dst = slice::from_raw_parts_mut(out as *mut u8, s.len() + 1);
    dst[..s.len()].copy_from_slice(s.as_bytes());
    dst[s.len()] = 0;
}

unsafe fn read_c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

fn slot_index(id: c_int) -> usize {
    // negative ids map past any pool size and fail the slot check
    usize::try_from(id).unwrap_or(usize::MAX)
}

// ============================================================================
// SHARED DIFFICULTY
// ============================================================================

/// 1 if the hash's leading 8 bytes (big-endian) are below `target`.
#[no_mangle]
pub unsafe extern "C" fn zion_pow_meets_target(hash: *const u8, target: u64) -> c_int {
    guard(0, || match hash_ref(hash) {
        Some(hash) => difficulty::meets_target(hash, target) as c_int,
        None => 0,
    })
}

// ============================================================================
// COSMIC HARMONY
// ============================================================================

#[no_mangle]
pub extern "C" fn cosmic_harmony_initialize() -> bool {
    guard(false, cosmic_harmony::initialize)
}

/// 32-byte hash of `input || nonce_le` into `output`.
#[no_mangle]
pub unsafe extern "C" fn cosmic_hash(
    input_ptr: *const u8,
    input_len: usize,
    nonce: u32,
    output: *mut u8,
) {
    guard((), || {
        if output.is_null() {
            return;
        }
        match input(input_ptr, input_len) {
            Some(data) => write_hash(output, &cosmic_harmony::cosmic_hash(data, nonce)),
            None => write_hash(output, &[0u8; 32]),
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn check_difficulty(hash: *const u8, target_difficulty: u64) -> bool {
    guard(false, || match hash_ref(hash) {
        Some(hash) => cosmic_harmony::check_difficulty(hash, target_difficulty),
        None => false,
    })
}

/// Nonce search. Returns 1 and fills `out_nonce`/`out_hash` on a share,
/// 0 when `max_iterations` ran out, negative on bad arguments.
#[no_mangle]
pub unsafe extern "C" fn cosmic_harmony_find_nonce(
    header_ptr: *const u8,
    header_len: usize,
    start_nonce: u32,
    max_iterations: u64,
    target: u64,
    out_nonce: *mut u32,
    out_hash: *mut u8,
) -> c_int {
    guard(-1, || {
        let Some(header) = input(header_ptr, header_len) else {
            return PowError::InvalidParams("null header".into()).code();
        };
        if out_nonce.is_null() || out_hash.is_null() {
            return PowError::InvalidParams("null output".into()).code();
        }
        match cosmic_harmony::find_nonce(header, start_nonce, max_iterations, target) {
            Some((nonce, hash)) => {
                *out_nonce = nonce;
                write_hash(out_hash, &hash);
                1
            }
            None => 0,
        }
    })
}

// ============================================================================
// YESCRYPT
// ============================================================================

/// 0 on success (also when already initialized), negative on error.
#[no_mangle]
pub extern "C" fn zion_yescrypt_init(n: u64, r: u32, p: u32, threads: c_int) -> c_int {
    guard(-1, || {
        let threads = usize::try_from(threads).unwrap_or(0);
        match yescrypt::global().init(YescryptParams::new(n, r, p), threads) {
            Ok(()) => 0,
            Err(e) => {
                log::error!("zion_yescrypt_init failed: {}", e);
                e.code()
            }
        }
    })
}

#[no_mangle]
pub extern "C" fn zion_yescrypt_cleanup() {
    guard((), || yescrypt::global().cleanup())
}

#[no_mangle]
pub extern "C" fn zion_yescrypt_get_num_threads() -> c_int {
    guard(0, || yescrypt::global().num_threads() as c_int)
}

/// 0 on success; `InvalidSlot` (-2) for an out-of-range `thread_id`.
#[no_mangle]
pub unsafe extern "C" fn zion_yescrypt_hash(
    thread_id: c_int,
    data: *const u8,
    data_len: usize,
    output: *mut u8,
) -> c_int {
    guard(-1, || {
        let Some(data) = input(data, data_len) else {
            return PowError::InvalidParams("null data".into()).code();
        };
        if output.is_null() {
            return PowError::InvalidParams("null output".into()).code();
        }
        match yescrypt::global().hash(slot_index(thread_id), data) {
            Ok(hash) => {
                write_hash(output, &hash);
                0
            }
            Err(e) => e.code(),
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn zion_yescrypt_hash_auto(
    data: *const u8,
    data_len: usize,
    output: *mut u8,
) -> c_int {
    guard(-1, || {
        let Some(data) = input(data, data_len) else {
            return PowError::InvalidParams("null data".into()).code();
        };
        if output.is_null() {
            return PowError::InvalidParams("null output".into()).code();
        }
        match yescrypt::global().hash_auto(data) {
            Ok(hash) => {
                write_hash(output, &hash);
                0
            }
            Err(e) => e.code(),
        }
    })
}

/// 1 if hash value < difficulty, else 0.
#[no_mangle]
pub unsafe extern "C" fn zion_yescrypt_check_difficulty(hash: *const u8, difficulty: u64) -> c_int {
    guard(0, || match hash_ref(hash) {
        Some(hash) => yescrypt::YescryptEngine::check_difficulty(hash, difficulty) as c_int,
        None => 0,
    })
}

/// Lowercase hex of `len` bytes; `hex_out` must hold `2 * len + 1` bytes.
#[no_mangle]
pub unsafe extern "C" fn zion_yescrypt_bytes_to_hex(bytes: *const u8, len: usize, hex_out: *mut c_char) {
    guard((), || {
        if hex_out.is_null() {
            return;
        }
        if let Some(bytes) = input(bytes, len) {
            write_c_string(hex_out, &hexutil::bytes_to_hex(bytes));
        }
    })
}

#[no_mangle]
pub extern "C" fn zion_yescrypt_version() -> *const c_char {
    YESCRYPT_VERSION_C.as_ptr() as *const c_char
}

/// Hashes/second on one slot, -1.0 when not initialized or the slot is invalid.
#[no_mangle]
pub extern "C" fn zion_yescrypt_benchmark(thread_id: c_int, num_hashes: c_int) -> f64 {
    guard(-1.0, || {
        let num_hashes = u32::try_from(num_hashes).unwrap_or(0);
        yescrypt::global()
            .benchmark(slot_index(thread_id), num_hashes)
            .unwrap_or(-1.0)
    })
}

/// Default mining parameters (N=4096, r=8, p=1); `threads <= 0` uses all CPUs.
#[no_mangle]
pub extern "C" fn yescrypt_init_mining(threads: c_int) -> c_int {
    let threads = if threads <= 0 { num_cpus::get() as c_int } else { threads };
    let params = YescryptParams::default();
    zion_yescrypt_init(params.n, params.r, params.p, threads)
}

/// Hex in, hex out; `hex_output` must hold 65 bytes. -4 on malformed hex.
#[no_mangle]
pub unsafe extern "C" fn yescrypt_hash_hex(hex_data: *const c_char, hex_output: *mut c_char) -> c_int {
    guard(-1, || {
        let Some(hex_data) = read_c_str(hex_data) else {
            return PowError::InvalidHex("null or non-UTF-8 input".into()).code();
        };
        if hex_output.is_null() {
            return PowError::InvalidParams("null output".into()).code();
        }
        match yescrypt::global().hash_hex(hex_data) {
            Ok(hex) => {
                write_c_string(hex_output, &hex);
                0
            }
            Err(e) => e.code(),
        }
    })
}

/// 1 if the engine (initialized on demand) produces a hash, else 0.
#[no_mangle]
pub extern "C" fn yescrypt_test() -> c_int {
    guard(0, || match yescrypt::global().self_test() {
        Ok(true) => 1,
        _ => 0,
    })
}

// ============================================================================
// RANDOMX
// ============================================================================

#[cfg(feature = "randomx")]
mod randomx_abi {
    use std::os::raw::c_void;

    use super::*;
    use crate::randomx;

    /// Build cache/dataset/VM pool. Honours `ZION_RANDOMX_LIGHT` and
    /// `ZION_RANDOMX_FULL_MEM`.
    #[no_mangle]
    pub unsafe extern "C" fn randomx_init(key: *const c_void, key_size: usize, threads: c_int) -> bool {
        guard(false, || {
            let Some(key) = input(key as *const u8, key_size) else {
                return false;
            };
            let threads = usize::try_from(threads).unwrap_or(1);
            match randomx::global().init_with_threads(key, threads) {
                Ok(_) => true,
                Err(e) => {
                    log::error!("❌ RandomX init failed: {}", e);
                    false
                }
            }
        })
    }

    /// Hash on the calling thread's VM. Zero-fills `output` when not initialized.
    #[no_mangle]
    pub unsafe extern "C" fn zion_randomx_hash_raw(input_ptr: *const c_void, input_size: usize, output: *mut c_void) {
        guard((), || {
            if output.is_null() {
                return;
            }
            let out = output as *mut u8;
            let hash = input(input_ptr as *const u8, input_size)
                .ok_or_else(|| PowError::InvalidParams("null input".into()))
                .and_then(|data| randomx::global().hash_raw(data))
                .unwrap_or([0u8; 32]);
            write_hash(out, &hash);
        })
    }

    /// Hash on VM `vm_index`. Zero-fills `output` on an invalid index.
    #[no_mangle]
    pub unsafe extern "C" fn zion_randomx_hash_vm(
        vm_index: c_int,
        input_ptr: *const c_void,
        input_size: usize,
        output: *mut c_void,
    ) {
        guard((), || {
            if output.is_null() {
                return;
            }
            let out = output as *mut u8;
            let hash = input(input_ptr as *const u8, input_size)
                .ok_or_else(|| PowError::InvalidParams("null input".into()))
                .and_then(|data| randomx::global().hash_vm(slot_index(vm_index), data))
                .unwrap_or_else(|e| {
                    log::error!("❌ RandomX hash_vm({}) failed: {}", vm_index, e);
                    [0u8; 32]
                });
            write_hash(out, &hash);
        })
    }

    #[no_mangle]
    pub extern "C" fn randomx_get_num_threads() -> c_int {
        guard(0, || randomx::global().num_threads() as c_int)
    }

    #[no_mangle]
    pub extern "C" fn randomx_cleanup() {
        guard((), || randomx::global().cleanup())
    }

    /// 1 on success, 0 on failure or malformed key hex.
    #[no_mangle]
    pub unsafe extern "C" fn zion_randomx_init(key_hex: *const c_char, threads: c_int) -> c_int {
        guard(0, || {
            let Some(key_hex) = read_c_str(key_hex) else {
                return 0;
            };
            let key = match hexutil::hex_to_bytes(key_hex) {
                Ok(key) => key,
                Err(e) => {
                    log::error!("zion_randomx_init: {}", e);
                    return 0;
                }
            };
            let threads = usize::try_from(threads).unwrap_or(1).max(1);
            randomx::global().init_with_threads(&key, threads).is_ok() as c_int
        })
    }

    /// Hex in, hex out (`output_hex` must hold 65 bytes). Malformed hex or an
    /// uninitialized engine yields 64 zeros.
    #[no_mangle]
    pub unsafe extern "C" fn zion_randomx_hash(input_hex: *const c_char, output_hex: *mut c_char) {
        guard((), || {
            if output_hex.is_null() {
                return;
            }
            let hex = read_c_str(input_hex)
                .ok_or_else(|| PowError::InvalidHex("null input".into()))
                .and_then(|s| randomx::global().hash_hex(s))
                .unwrap_or_else(|e| {
                    log::error!("zion_randomx_hash: {}", e);
                    hexutil::bytes_to_hex(&[0u8; 32])
                });
            write_c_string(output_hex, &hex);
        })
    }

    #[no_mangle]
    pub unsafe extern "C" fn zion_randomx_hash_bytes(input_ptr: *const u8, input_len: usize, output: *mut u8) {
        zion_randomx_hash_raw(input_ptr as *const c_void, input_len, output as *mut c_void)
    }

    #[no_mangle]
    pub unsafe extern "C" fn zion_randomx_hash_bytes_vm(
        vm_index: c_int,
        input_ptr: *const u8,
        input_len: usize,
        output: *mut u8,
    ) {
        zion_randomx_hash_vm(vm_index, input_ptr as *const c_void, input_len, output as *mut c_void)
    }

    #[no_mangle]
    pub extern "C" fn zion_randomx_get_num_threads() -> c_int {
        randomx_get_num_threads()
    }

    /// 1 if the hash has at least `difficulty` leading zero bytes (1..=32).
    #[no_mangle]
    pub unsafe extern "C" fn zion_randomx_check_difficulty(hash: *const u8, difficulty: c_int) -> c_int {
        guard(0, || {
            let Some(hash) = hash_ref(hash) else {
                return 0;
            };
            if !(1..=32).contains(&difficulty) {
                return 0;
            }
            crate::difficulty::meets_leading_zero_bytes(hash, difficulty as u32) as c_int
        })
    }

    /// 1 if hash value < target, else 0.
    #[no_mangle]
    pub unsafe extern "C" fn zion_randomx_check_target(hash: *const u8, target: u64) -> c_int {
        zion_pow_meets_target(hash, target)
    }

    #[no_mangle]
    pub extern "C" fn zion_randomx_cleanup() {
        randomx_cleanup()
    }

    #[no_mangle]
    pub extern "C" fn zion_randomx_version() -> *const c_char {
        RANDOMX_VERSION_C.as_ptr() as *const c_char
    }
}

#[cfg(feature = "randomx")]
pub use randomx_abi::*;

// ============================================================================
// AUTOLYKOS
// ============================================================================

/// CPU version of `autolykos_kernel` with the same argument layout:
/// `outputs` receives `count * 32` bytes. 0 on success, -7 when
/// `input_len > 192`.
#[no_mangle]
pub unsafe extern "C" fn autolykos_hash_batch_cpu(
    inputs: *const u8,
    input_len: u32,
    nonces: *const u32,
    outputs: *mut u8,
    count: u32,
) -> c_int {
    guard(-1, || {
        let Some(data) = input(inputs, input_len as usize) else {
            return PowError::InvalidParams("null inputs".into()).code();
        };
        if count == 0 {
            return 0;
        }
        if nonces.is_null() || outputs.is_null() {
            return PowError::InvalidParams("null nonces/outputs".into()).code();
        }
        let nonces = slice::from_raw_parts(nonces, count as usize);
        match autolykos::autolykos_hash_batch(data, nonces) {
            Ok(hashes) => {
                let out = slice::from_raw_parts_mut(outputs, count as usize * K_HASH_BYTES);
                for (dst, hash) in out.chunks_exact_mut(K_HASH_BYTES).zip(hashes.iter()) {
                    dst.copy_from_slice(hash);
                }
                0
            }
            Err(e) => e.code(),
        }
    })
}
