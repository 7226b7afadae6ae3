//! RandomX VM-pool mining service.
//!
//! One cache (and, in full-memory mode, one dataset) shared read-only by a
//! pool of VMs, one VM per mining thread. Each VM sits behind its own mutex:
//! different VMs hash concurrently, the same VM never runs two hashes at once.
//!
//! Init path:
//! 1. flags = recommended CPU flags + FULL_MEM (unless light) + LARGE_PAGES
//! 2. cache alloc, retried once without large pages
//! 3. dataset alloc, retried once without large pages, else light mode
//! 4. dataset fill split across `min(hw, threads, 32)` workers
//! 5. VM pool, first failure retried without large pages; any later failure
//!    drops the VMs already built and fails the init
//! 6. 16-hash sample on VM 0 for a realistic H/s log line

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use randomx_rs::RandomXFlag;
use serde::Serialize;

use super::ffi::{Cache, Dataset, Vm};
use crate::backend::{Algorithm, PowBackend};
use crate::config::{MemoryMode, RandomXConfig, RANDOMX_MAX_THREADS};
use crate::difficulty;
use crate::error::{PowError, Result};
use crate::input::RANDOMX_NONCE_OFFSET;

pub const VERSION: &str = concat!("ZION RandomX ", env!("CARGO_PKG_VERSION"), " (Multi-threaded)");

/// Hashes in the post-init speed sample.
const SAMPLE_HASHES: u32 = 16;
/// Buffer length of the speed sample.
const SAMPLE_INPUT_LEN: usize = 76;

const ENGINE: &str = "randomx";

/// Unique id per built state, so a thread's cached slot never leaks across
/// engines or re-inits.
static NEXT_STATE_ID: AtomicUsize = AtomicUsize::new(1);

static GLOBAL: Lazy<RandomXEngine> = Lazy::new(RandomXEngine::new);

/// Process-wide engine behind the C ABI.
pub fn global() -> &'static RandomXEngine {
    &GLOBAL
}

thread_local! {
    /// `(state id, vm slot)` assigned to this OS thread.
    static THREAD_SLOT: Cell<(usize, usize)> = Cell::new((0, 0));
}

/// Settings the engine actually ended up with after fallbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RandomXStatus {
    pub threads: usize,
    pub full_memory: bool,
    pub large_pages: bool,
    pub key_len: usize,
    pub flags: u32,
}

// Field order is drop order: VMs reference the dataset and cache.
struct RandomXState {
    id: usize,
    vms: Vec<Mutex<Vm>>,
    _dataset: Option<Dataset>,
    _cache: Cache,
    status: RandomXStatus,
}

pub struct RandomXEngine {
    init_lock: Mutex<()>,
    state: RwLock<Option<Arc<RandomXState>>>,
    next_slot: AtomicUsize,
}

fn describe(flags: RandomXFlag) -> String {
    let mode = if flags.contains(RandomXFlag::FLAG_FULL_MEM) { "FULL" } else { "LIGHT" };
    let jit = if flags.contains(RandomXFlag::FLAG_JIT) { "+JIT" } else { "" };
    let aes = if flags.contains(RandomXFlag::FLAG_HARD_AES) { "+HARD_AES" } else { "" };
    let hp = if flags.contains(RandomXFlag::FLAG_LARGE_PAGES) { "+HUGEPAGES" } else { "" };
    format!("0x{:x} mode={}{}{}{}", flags.bits(), mode, jit, aes, hp)
}

/// Requested VM count clamped to `[1, 64]`.
pub fn clamp_threads(requested: usize) -> usize {
    requested.clamp(1, RANDOMX_MAX_THREADS)
}

/// Workers used to fill the dataset.
pub fn dataset_init_threads(hw_threads: usize, mining_threads: usize, cap: usize) -> usize {
    hw_threads.min(mining_threads).min(cap).max(1)
}

fn alloc_cache(flags: &mut RandomXFlag) -> Result<Cache> {
    if let Some(cache) = Cache::alloc(*flags) {
        return Ok(cache);
    }
    if flags.contains(RandomXFlag::FLAG_LARGE_PAGES) {
        log::warn!("⚠️  Large pages unavailable for cache, retrying without large pages");
        flags.remove(RandomXFlag::FLAG_LARGE_PAGES);
        if let Some(cache) = Cache::alloc(*flags) {
            return Ok(cache);
        }
    }
    log::error!("❌ Failed to allocate RandomX cache");
    Err(PowError::Allocation("RandomX cache".into()))
}

fn alloc_dataset(flags: &mut RandomXFlag) -> Option<Dataset> {
    log::info!("⏳ Allocating RandomX dataset (~2GB)...");
    if let Some(dataset) = Dataset::alloc(*flags) {
        return Some(dataset);
    }
    if flags.contains(RandomXFlag::FLAG_LARGE_PAGES) {
        log::warn!("⚠️  Large pages unavailable for dataset, retrying without large pages");
        flags.remove(RandomXFlag::FLAG_LARGE_PAGES);
        if let Some(dataset) = Dataset::alloc(*flags) {
            return Some(dataset);
        }
    }
    log::warn!("⚠️  Failed to allocate RandomX dataset; falling back to cache-only mode");
    flags.remove(RandomXFlag::FLAG_FULL_MEM);
    None
}

fn build_vm_pool(
    count: usize,
    flags: &mut RandomXFlag,
    cache: &Cache,
    dataset: Option<&Dataset>,
) -> Result<Vec<Mutex<Vm>>> {
    log::info!("⏳ Creating {} RandomX VMs...", count);
    let mut vms = Vec::with_capacity(count);
    let mut retried = false;

    for i in 0..count {
        let mut vm = Vm::create(*flags, cache, dataset);
        if vm.is_none() && !retried && flags.contains(RandomXFlag::FLAG_LARGE_PAGES) {
            log::warn!("⚠️  Large pages unavailable for VM, falling back to small pages");
            flags.remove(RandomXFlag::FLAG_LARGE_PAGES);
            retried = true;
            vm = Vm::create(*flags, cache, dataset);
        }
        match vm {
            Some(vm) => vms.push(Mutex::new(vm)),
            None => {
                log::error!("❌ Failed to create VM #{} (releasing {} built VMs)", i, vms.len());
                return Err(PowError::Allocation(format!("RandomX VM #{i}")));
            }
        }
    }
    Ok(vms)
}

impl RandomXEngine {
    pub fn new() -> Self {
        Self {
            init_lock: Mutex::new(()),
            state: RwLock::new(None),
            next_slot: AtomicUsize::new(0),
        }
    }

    /// Build cache, dataset and VM pool for `key`. Any previous state is torn
    /// down first, so re-init with a new seed key is the normal epoch switch.
    pub fn init(&self, key: &[u8], config: &RandomXConfig) -> Result<RandomXStatus> {
        config.validate()?;
        let _guard = self.init_lock.lock();

        let threads = clamp_threads(config.threads);
        let hw_threads = num_cpus::get();
        if config.threads > RANDOMX_MAX_THREADS {
            log::warn!(
                "⚠️  Requested {} RandomX threads, capped at {}",
                config.threads, RANDOMX_MAX_THREADS
            );
        }
        if threads > hw_threads {
            log::warn!(
                "⚠️  Requested {} threads but only {} hardware threads available",
                threads, hw_threads
            );
        }

        if self.state.write().take().is_some() {
            log::info!("RandomX re-init: released previous cache/dataset/VM pool");
        }

        let mut flags = RandomXFlag::get_recommended_flags();
        if config.memory_mode == MemoryMode::Full {
            flags |= RandomXFlag::FLAG_FULL_MEM;
        }
        if config.large_pages {
            flags |= RandomXFlag::FLAG_LARGE_PAGES;
        }
        log::info!("⚡ RandomX init: threads={}, flags {}", threads, describe(flags));

        let mut cache = alloc_cache(&mut flags)?;
        cache.init(key);
        log::info!("✅ RandomX cache initialized ({} byte key)", key.len());

        let dataset = if flags.contains(RandomXFlag::FLAG_FULL_MEM) {
            alloc_dataset(&mut flags).map(|mut dataset| {
                let workers =
                    dataset_init_threads(hw_threads, threads, config.max_dataset_init_threads);
                log::info!(
                    "⏳ Initializing RandomX dataset with {} threads (10-60 seconds)...",
                    workers
                );
                let start = Instant::now();
                dataset.init(&cache, workers);
                log::info!("✅ Dataset initialized in {} ms", start.elapsed().as_millis());
                dataset
            })
        } else {
            None
        };

        let vms = build_vm_pool(threads, &mut flags, &cache, dataset.as_ref())?;

        let status = RandomXStatus {
            threads: vms.len(),
            full_memory: dataset.is_some(),
            large_pages: flags.contains(RandomXFlag::FLAG_LARGE_PAGES),
            key_len: key.len(),
            flags: flags.bits(),
        };
        log::info!(
            "✅ RandomX ready: {} VMs, FULL_MEM={}, LARGE_PAGES={}",
            status.threads,
            if status.full_memory { "YES" } else { "NO (cache-only)" },
            if status.large_pages { "enabled" } else { "disabled" }
        );

        let state = Arc::new(RandomXState {
            id: NEXT_STATE_ID.fetch_add(1, Ordering::Relaxed),
            vms,
            _dataset: dataset,
            _cache: cache,
            status: status.clone(),
        });

        let rate = Self::sample_on(&state, SAMPLE_HASHES);
        log::info!("🚀 RandomX sample speed (1 VM): ~{:.0} H/s", rate);

        *self.state.write() = Some(state);
        self.next_slot.store(0, Ordering::Relaxed);
        Ok(status)
    }

    /// Init with only a thread count, honouring the `ZION_RANDOMX_*` env vars.
    pub fn init_with_threads(&self, key: &[u8], threads: usize) -> Result<RandomXStatus> {
        self.init(key, &RandomXConfig::with_threads(threads).with_env_overrides())
    }

    pub fn cleanup(&self) {
        let _guard = self.init_lock.lock();
        if self.state.write().take().is_some() {
            log::info!("RandomX cleanup complete");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().is_some()
    }

    /// VM count, 0 when not initialized.
    pub fn num_threads(&self) -> usize {
        self.state.read().as_ref().map_or(0, |s| s.vms.len())
    }

    pub fn status(&self) -> Option<RandomXStatus> {
        self.state.read().as_ref().map(|s| s.status.clone())
    }

    fn snapshot(&self) -> Result<Arc<RandomXState>> {
        self.state.read().clone().ok_or_else(|| {
            log::error!("❌ RandomX not initialized! Call init first");
            PowError::NotInitialized { engine: ENGINE }
        })
    }

    fn hash_on(state: &RandomXState, slot: usize, input: &[u8]) -> Result<[u8; 32]> {
        let vm = state.vms.get(slot).ok_or(PowError::InvalidSlot {
            slot,
            slots: state.vms.len(),
        })?;
        let hash = vm.lock().calculate_hash(input);
        Ok(hash)
    }

    /// Slot for the calling thread: assigned round-robin on first use, then
    /// reused until the engine is rebuilt.
    fn thread_slot(&self, state: &RandomXState) -> usize {
        THREAD_SLOT.with(|cell| {
            let (id, slot) = cell.get();
            if id == state.id && slot < state.vms.len() {
                return slot;
            }
            let slot = self.next_slot.fetch_add(1, Ordering::Relaxed) % state.vms.len();
            cell.set((state.id, slot));
            slot
        })
    }

    /// Hash on this thread's VM.
    pub fn hash_raw(&self, input: &[u8]) -> Result<[u8; 32]> {
        let state = self.snapshot()?;
        let slot = self.thread_slot(&state);
        Self::hash_on(&state, slot, input)
    }

    /// Hash on an explicit VM.
    pub fn hash_vm(&self, index: usize, input: &[u8]) -> Result<[u8; 32]> {
        let state = self.snapshot()?;
        Self::hash_on(&state, index, input)
    }

    /// Hex in, hex out.
    pub fn hash_hex(&self, input_hex: &str) -> Result<String> {
        let input = crate::hexutil::hex_to_bytes(input_hex)?;
        Ok(crate::hexutil::bytes_to_hex(&self.hash_raw(&input)?))
    }

    pub fn check_difficulty(hash: &[u8; 32], target: u64) -> bool {
        difficulty::meets_target(hash, target)
    }

    /// Legacy "at least `zero_bytes` leading zero bytes" check.
    pub fn check_leading_zeros(hash: &[u8; 32], zero_bytes: u32) -> bool {
        difficulty::meets_leading_zero_bytes(hash, zero_bytes)
    }

    fn sample_on(state: &RandomXState, samples: u32) -> f64 {
        let Some(vm) = state.vms.first() else {
            return 0.0;
        };
        let mut vm = vm.lock();
        let mut input = [0u8; SAMPLE_INPUT_LEN];
        let start = Instant::now();
        for i in 0..samples {
            input[RANDOMX_NONCE_OFFSET] = i as u8;
            vm.calculate_hash(&input);
        }
        samples as f64 / start.elapsed().as_secs_f64().max(1e-9)
    }

    /// Single-VM hashes/second over `samples` hashes.
    pub fn sample_hashrate(&self, samples: u32) -> Result<f64> {
        let state = self.snapshot()?;
        Ok(Self::sample_on(&state, samples))
    }
}

impl Default for RandomXEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PowBackend for RandomXEngine {
    fn algorithm(&self) -> Algorithm {
        Algorithm::RandomX
    }

    fn hash(&self, input: &[u8]) -> Result<[u8; 32]> {
        self.hash_raw(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light(threads: usize) -> RandomXConfig {
        RandomXConfig {
            large_pages: false,
            ..RandomXConfig::light(threads)
        }
    }

    #[test]
    fn test_thread_clamps() {
        assert_eq!(clamp_threads(0), 1);
        assert_eq!(clamp_threads(8), 8);
        assert_eq!(clamp_threads(500), 64);
        assert_eq!(dataset_init_threads(16, 4, 32), 4);
        assert_eq!(dataset_init_threads(128, 64, 32), 32);
        assert_eq!(dataset_init_threads(0, 4, 32), 1);
    }

    #[test]
    fn test_not_initialized() {
        let engine = RandomXEngine::new();
        assert_eq!(engine.num_threads(), 0);
        assert!(engine.status().is_none());
        assert!(matches!(engine.hash_raw(b"x"), Err(PowError::NotInitialized { .. })));
        assert!(matches!(engine.hash_vm(0, b"x"), Err(PowError::NotInitialized { .. })));
    }

    #[test]
    fn test_light_mode_hashing() {
        let engine = RandomXEngine::new();
        let status = engine.init(b"seed", &light(2)).unwrap();
        assert_eq!(status.threads, 2);
        assert!(!status.full_memory);
        assert_eq!(status.key_len, 4);

        let input = [7u8; 80];
        let a = engine.hash_vm(0, &input).unwrap();
        let b = engine.hash_vm(1, &input).unwrap();
        assert_eq!(a, b, "every VM computes the same function");
        assert_eq!(engine.hash_raw(&input).unwrap(), a);
        assert!(matches!(
            engine.hash_vm(2, &input),
            Err(PowError::InvalidSlot { slot: 2, slots: 2 })
        ));

        let mut other = input;
        other[RANDOMX_NONCE_OFFSET] = 1;
        assert_ne!(engine.hash_raw(&other).unwrap(), a);
    }

    #[test]
    fn test_reinit_new_key_rebuilds() {
        let engine = RandomXEngine::new();
        engine.init(b"key-one", &light(1)).unwrap();
        let first = engine.hash_raw(b"block").unwrap();

        engine.init(b"key-two", &light(3)).unwrap();
        assert_eq!(engine.num_threads(), 3);
        let second = engine.hash_raw(b"block").unwrap();
        assert_ne!(first, second);

        engine.init(b"key-one", &light(1)).unwrap();
        assert_eq!(engine.hash_raw(b"block").unwrap(), first);
    }

    #[test]
    fn test_cleanup() {
        let engine = RandomXEngine::new();
        engine.init(b"seed", &light(1)).unwrap();
        engine.cleanup();
        assert_eq!(engine.num_threads(), 0);
        assert!(engine.hash_raw(b"x").is_err());
        engine.cleanup();
    }

    #[test]
    fn test_leading_zero_check() {
        let mut hash = [0xffu8; 32];
        hash[..3].fill(0);
        assert!(RandomXEngine::check_leading_zeros(&hash, 3));
        assert!(!RandomXEngine::check_leading_zeros(&hash, 4));
        assert!(RandomXEngine::check_difficulty(&hash, u64::MAX));

        hash[..8].fill(0);
        assert!(RandomXEngine::check_leading_zeros(&hash, 8));
        assert!(!RandomXEngine::check_leading_zeros(&hash, 9));
        hash[..12].fill(0);
        assert!(RandomXEngine::check_leading_zeros(&hash, 12));
        assert!(!RandomXEngine::check_leading_zeros(&hash, 13));
    }

    #[test]
    fn test_concurrent_threads_pick_slots() {
        let engine = Arc::new(RandomXEngine::new());
        engine.init(b"seed", &light(2)).unwrap();
        let expected = engine.hash_vm(0, b"shared").unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    let a = engine.hash_raw(b"shared").unwrap();
                    let b = engine.hash_raw(b"shared").unwrap();
                    (a, b)
                })
            })
            .collect();
        for h in handles {
            let (a, b) = h.join().unwrap();
            assert_eq!(a, expected);
            assert_eq!(b, expected);
        }
    }

    #[test]
    fn test_sample_hashrate() {
        let engine = RandomXEngine::new();
        engine.init(b"seed", &light(1)).unwrap();
        assert!(engine.sample_hashrate(2).unwrap() > 0.0);
    }
}
