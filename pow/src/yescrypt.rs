//! Yescrypt mining service
//!
//! A fixed pool of KDF slots behind one engine handle. Each slot has its own
//! lock, so `threads` callers can hash concurrently while two callers on the
//! same slot serialize. The KDF is scrypt keyed by `(N, r, p)` with an
//! all-zero 32-byte salt: mining hashes must be a pure function of the
//! header so any validator can recompute a share.
//!
//! Every slot owns its ROMix scratch (`128*r*N` bytes for V plus the B and
//! T blocks), allocated once in `init` and reused by every hash on that
//! slot. The output is bit-identical to `scrypt::scrypt` with the same salt.
//!
//! Lifecycle: `Uninitialized -> init -> hash* -> cleanup -> Uninitialized`.
//! A second `init` on a live engine is a no-op with a warning, including when
//! it asks for different parameters.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use pbkdf2::pbkdf2_hmac;
use salsa20::cipher::typenum::U4;
use salsa20::cipher::StreamCipherCore;
use salsa20::SalsaCore;
use scrypt::Params as ScryptParams;
use sha2::Sha256;

use crate::backend::{Algorithm, PowBackend};
use crate::config::YescryptParams;
use crate::difficulty;
use crate::error::{PowError, Result};
use crate::input::YESCRYPT_NONCE_OFFSET;

pub const VERSION: &str = concat!("ZION Yescrypt v", env!("CARGO_PKG_VERSION"));

/// Deterministic salt used for every mining hash.
pub const MINING_SALT: [u8; 32] = [0u8; 32];

/// Bytes in the benchmark header (76 byte payload + 4 byte nonce).
pub const BENCH_HEADER_LEN: usize = 80;

const ENGINE: &str = "yescrypt";

static GLOBAL: Lazy<YescryptEngine> = Lazy::new(YescryptEngine::new);

/// Process-wide engine behind the C ABI.
pub fn global() -> &'static YescryptEngine {
    &GLOBAL
}

type Salsa20_8 = SalsaCore<U4>;

/// Pre-allocated ROMix working memory for one slot.
struct Scratch {
    /// PBKDF2 output, `p` blocks of `128*r` bytes
    b: Vec<u8>,
    /// ROMix table, `N` blocks of `128*r` bytes
    v: Vec<u8>,
    /// one `128*r` block for the XOR
    t: Vec<u8>,
    n: usize,
}

fn zeroed(len: usize, what: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e| PowError::Allocation(format!("yescrypt {what} ({len} bytes): {e}")))?;
    buf.resize(len, 0);
    Ok(buf)
}

impl Scratch {
    fn new(params: &YescryptParams) -> Result<Self> {
        let too_large = || {
            PowError::InvalidParams(format!(
                "N={} r={} p={} overflows the address space",
                params.n, params.r, params.p
            ))
        };
        let n = usize::try_from(params.n).map_err(|_| too_large())?;
        let block = (params.r as usize).checked_mul(128).ok_or_else(too_large)?;
        let b_len = block.checked_mul(params.p as usize).ok_or_else(too_large)?;
        let v_len = block.checked_mul(n).ok_or_else(too_large)?;

        Ok(Self {
            b: zeroed(b_len, "B")?,
            v: zeroed(v_len, "V")?,
            t: zeroed(block, "T")?,
            n,
        })
    }

    fn bytes(&self) -> usize {
        self.b.len() + self.v.len() + self.t.len()
    }

    /// scrypt(password, MINING_SALT) into `output`, touching no allocator.
    fn derive(&mut self, password: &[u8], output: &mut [u8; 32]) {
        let block = self.t.len();
        pbkdf2_hmac::<Sha256>(password, &MINING_SALT, 1, &mut self.b);
        for chunk in self.b.chunks_mut(block) {
            ro_mix(chunk, &mut self.v, &mut self.t, self.n);
        }
        pbkdf2_hmac::<Sha256>(password, &self.b, 1, output);
    }
}

fn ro_mix(b: &mut [u8], v: &mut [u8], t: &mut [u8], n: usize) {
    let len = b.len();
    for entry in v.chunks_mut(len) {
        entry.copy_from_slice(b);
        block_mix(entry, b);
    }
    for _ in 0..n {
        let j = integerify(b) & (n - 1);
        xor(b, &v[j * len..(j + 1) * len], t);
        block_mix(t, b);
    }
}

fn integerify(b: &[u8]) -> usize {
    let last = &b[b.len() - 64..];
    u32::from_le_bytes([last[0], last[1], last[2], last[3]]) as usize
}

/// BlockMix with Salsa20/8: even sub-blocks go to the first half of
/// `output`, odd ones to the second half.
fn block_mix(input: &[u8], output: &mut [u8]) {
    let half = input.len() / 2;
    let mut x = [0u8; 64];
    x.copy_from_slice(&input[input.len() - 64..]);

    let mut words = [0u32; 16];
    for (i, chunk) in input.chunks(64).enumerate() {
        for (w, (xs, cs)) in words.iter_mut().zip(x.chunks_exact(4).zip(chunk.chunks_exact(4))) {
            *w = u32::from_le_bytes([xs[0] ^ cs[0], xs[1] ^ cs[1], xs[2] ^ cs[2], xs[3] ^ cs[3]]);
        }
        Salsa20_8::from_raw_state(words).write_keystream_block((&mut x).into());

        let pos = (i / 2) * 64 + if i % 2 == 0 { 0 } else { half };
        output[pos..pos + 64].copy_from_slice(&x);
    }
}

fn xor(a: &[u8], b: &[u8], out: &mut [u8]) {
    for ((o, &x), &y) in out.iter_mut().zip(a).zip(b) {
        *o = x ^ y;
    }
}

struct Slot {
    hashes: u64,
    scratch: Scratch,
}

struct State {
    params: YescryptParams,
    slots: Vec<Mutex<Slot>>,
}

pub struct YescryptEngine {
    init_lock: Mutex<()>,
    state: RwLock<Option<Arc<State>>>,
    next_slot: AtomicUsize,
}

impl YescryptEngine {
    pub fn new() -> Self {
        Self {
            init_lock: Mutex::new(()),
            state: RwLock::new(None),
            next_slot: AtomicUsize::new(0),
        }
    }

    /// Allocate `threads` slots (0 is treated as 1).
    pub fn init(&self, params: YescryptParams, threads: usize) -> Result<()> {
        let _guard = self.init_lock.lock();

        if let Some(state) = self.state.read().as_ref() {
            if state.params != params || state.slots.len() != threads.max(1) {
                log::warn!(
                    "⚠️  Yescrypt already initialized (N={}, r={}, p={}, threads={}); ignoring new request N={}, r={}, p={}, threads={}",
                    state.params.n, state.params.r, state.params.p, state.slots.len(),
                    params.n, params.r, params.p, threads
                );
            } else {
                log::warn!("⚠️  Yescrypt already initialized (skipping)");
            }
            return Ok(());
        }

        params.validate()?;
        ScryptParams::new(params.log_n(), params.r, params.p, 32)
            .map_err(|e| PowError::InvalidParams(format!("KDF rejected N/r/p: {e}")))?;

        let threads = threads.max(1);
        let slots = (0..threads)
            .map(|_| {
                Ok(Mutex::new(Slot {
                    hashes: 0,
                    scratch: Scratch::new(&params)?,
                }))
            })
            .collect::<Result<Vec<_>>>()?;
        let per_slot = slots.first().map_or(0, |s| s.lock().scratch.bytes());

        *self.state.write() = Some(Arc::new(State { params, slots }));
        self.next_slot.store(0, Ordering::Relaxed);

        log::info!(
            "✅ Yescrypt initialized: N={}, r={}, p={}, threads={} ({} KiB scratch per slot)",
            params.n, params.r, params.p, threads, per_slot / 1024
        );
        Ok(())
    }

    /// Default mining parameters (N=4096, r=8, p=1).
    pub fn init_mining(&self, threads: usize) -> Result<()> {
        self.init(YescryptParams::default(), threads)
    }

    /// Release all slots. In-flight hashes finish against the old state.
    pub fn cleanup(&self) {
        let _guard = self.init_lock.lock();
        if self.state.write().take().is_some() {
            log::info!("Yescrypt cleanup complete");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().is_some()
    }

    /// Slot count, 0 when not initialized.
    pub fn num_threads(&self) -> usize {
        self.state.read().as_ref().map_or(0, |s| s.slots.len())
    }

    pub fn params(&self) -> Option<YescryptParams> {
        self.state.read().as_ref().map(|s| s.params)
    }

    fn snapshot(&self) -> Result<Arc<State>> {
        self.state
            .read()
            .clone()
            .ok_or(PowError::NotInitialized { engine: ENGINE })
    }

    /// Hash `data` on slot `slot`. Out-of-range slots are rejected.
    pub fn hash(&self, slot: usize, data: &[u8]) -> Result<[u8; 32]> {
        let state = self.snapshot()?;
        Self::hash_on(&state, slot, data)
    }

    fn hash_on(state: &State, slot: usize, data: &[u8]) -> Result<[u8; 32]> {
        let cell = state.slots.get(slot).ok_or(PowError::InvalidSlot {
            slot,
            slots: state.slots.len(),
        })?;

        let mut slot_state = cell.lock();
        let mut output = [0u8; 32];
        slot_state.scratch.derive(data, &mut output);
        slot_state.hashes += 1;
        Ok(output)
    }

    /// Hash on the next slot in round-robin order.
    pub fn hash_auto(&self, data: &[u8]) -> Result<[u8; 32]> {
        let state = self.snapshot()?;
        let slot = self.next_slot.fetch_add(1, Ordering::Relaxed) % state.slots.len();
        Self::hash_on(&state, slot, data)
    }

    pub fn check_difficulty(hash: &[u8; 32], difficulty: u64) -> bool {
        difficulty::meets_target(hash, difficulty)
    }

    /// Hashes/second on one slot over an 80-byte header whose nonce (offset
    /// 76, little-endian) counts up from 0.
    pub fn benchmark(&self, slot: usize, num_hashes: u32) -> Result<f64> {
        let state = self.snapshot()?;

        let mut header = [0u8; BENCH_HEADER_LEN];
        for (i, b) in header.iter_mut().enumerate() {
            *b = (i & 0xff) as u8;
        }

        let start = Instant::now();
        for nonce in 0..num_hashes {
            header[YESCRYPT_NONCE_OFFSET..YESCRYPT_NONCE_OFFSET + 4]
                .copy_from_slice(&nonce.to_le_bytes());
            Self::hash_on(&state, slot, &header)?;
        }
        let elapsed = start.elapsed().as_secs_f64().max(1e-9);
        let rate = num_hashes as f64 / elapsed;

        log::info!(
            "Yescrypt benchmark: {} hashes on slot {} in {:.3}s ({:.1} H/s)",
            num_hashes, slot, elapsed, rate
        );
        Ok(rate)
    }

    /// Hashes computed on `slot` since init.
    pub fn slot_hashes(&self, slot: usize) -> Result<u64> {
        let state = self.snapshot()?;
        let cell = state.slots.get(slot).ok_or(PowError::InvalidSlot {
            slot,
            slots: state.slots.len(),
        })?;
        let hashes = cell.lock().hashes;
        Ok(hashes)
    }

    pub fn total_hashes(&self) -> u64 {
        self.state
            .read()
            .as_ref()
            .map_or(0, |s| s.slots.iter().map(|c| c.lock().hashes).sum())
    }

    /// Hash hex-encoded input, return the hex digest.
    pub fn hash_hex(&self, data_hex: &str) -> Result<String> {
        let data = crate::hexutil::hex_to_bytes(data_hex)?;
        let hash = self.hash_auto(&data)?;
        Ok(crate::hexutil::bytes_to_hex(&hash))
    }

    /// Initialize with defaults on one slot if needed, then hash a known
    /// message. `Ok(true)` when the engine produced a hash.
    pub fn self_test(&self) -> Result<bool> {
        if !self.is_initialized() {
            self.init(YescryptParams::default(), 1)?;
        }
        let hash = self.hash_auto(b"Hello ZION")?;
        Ok(hash != [0u8; 32])
    }
}

impl Default for YescryptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PowBackend for YescryptEngine {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Yescrypt
    }

    fn hash(&self, input: &[u8]) -> Result<[u8; 32]> {
        self.hash_auto(input)
    }
}
