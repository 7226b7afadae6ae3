//! Multi-threaded nonce search with deadline-based cancellation
//!
//! Hash calls cannot be interrupted, so workers check the stop flag and the
//! deadline between nonces and simply stop submitting new ones.

use crossbeam::channel;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use zion_pow::{PowBackend, PowError};

/// Nonces hashed between deadline checks.
const DEADLINE_CHECK_INTERVAL: u64 = 16;

#[derive(Debug, Clone)]
pub struct SearchParams {
    pub threads: usize,
    pub start_nonce: u32,
    /// Total nonces across all threads, at most 2^32
    pub max_nonces: u64,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Found,
    Exhausted,
    TimedOut,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub algorithm: String,
    pub status: SearchStatus,
    pub nonce: Option<u32>,
    pub hash: Option<String>,
    pub target: u64,
    pub hashes: u64,
    pub elapsed_secs: f64,
    pub hashrate: f64,
}

struct Share {
    nonce: u32,
    hash: [u8; 32],
}

/// Split `[0, total)` into `parts` contiguous, disjoint ranges.
pub fn partition(total: u64, parts: usize) -> Vec<(u64, u64)> {
    let parts = (parts.max(1) as u64).min(total.max(1));
    let base = total / parts;
    let extra = total % parts;

    let mut ranges = Vec::with_capacity(parts as usize);
    let mut begin = 0;
    for i in 0..parts {
        let len = base + u64::from(i < extra);
        ranges.push((begin, begin + len));
        begin += len;
    }
    ranges
}

/// Scan nonces on `params.threads` threads until a hash meets `target`, the
/// range runs out, or the deadline passes.
pub fn run(
    backend: &dyn PowBackend,
    header: &[u8],
    target: u64,
    params: &SearchParams,
) -> Result<SearchReport, PowError> {
    let max_nonces = params.max_nonces.min(1u64 << 32);
    let ranges = partition(max_nonces, params.threads);

    let stop = AtomicBool::new(false);
    let hashes = AtomicU64::new(0);
    let start = Instant::now();
    // None when the timeout runs past what Instant can represent
    let deadline = start.checked_add(params.timeout);
    let past_deadline = || deadline.is_some_and(|d| Instant::now() >= d);

    log::info!(
        "🔍 Searching {} nonces from {} on {} threads (target 0x{:016x}, timeout {:?})",
        max_nonces,
        params.start_nonce,
        ranges.len(),
        target,
        params.timeout
    );

    let (tx, rx) = channel::unbounded::<Result<Share, PowError>>();

    let outcome = std::thread::scope(|scope| {
        for (thread_idx, &(begin, end)) in ranges.iter().enumerate() {
            let tx = tx.clone();
            let stop = &stop;
            let hashes = &hashes;
            let past_deadline = &past_deadline;
            scope.spawn(move || {
                log::debug!("search thread {} nonces [{}, {})", thread_idx, begin, end);
                for (i, offset) in (begin..end).enumerate() {
                    if stop.load(Ordering::Relaxed) {
                        return;
                    }
                    if i as u64 % DEADLINE_CHECK_INTERVAL == 0 && past_deadline() {
                        return;
                    }

                    let nonce = params.start_nonce.wrapping_add(offset as u32);
                    let hash = match backend.hash_nonce(header, nonce) {
                        Ok(hash) => hash,
                        Err(e) => {
                            stop.store(true, Ordering::Relaxed);
                            let _ = tx.send(Err(e));
                            return;
                        }
                    };
                    hashes.fetch_add(1, Ordering::Relaxed);

                    if backend.check_difficulty(&hash, target) {
                        stop.store(true, Ordering::Relaxed);
                        let _ = tx.send(Ok(Share { nonce, hash }));
                        return;
                    }
                }
            });
        }
        drop(tx);

        // Blocks until the first share/error, or until every worker has exited.
        let first = rx.recv().ok();
        stop.store(true, Ordering::Relaxed);
        first
    });

    let elapsed = start.elapsed();
    let hashes = hashes.load(Ordering::Relaxed);
    let elapsed_secs = elapsed.as_secs_f64().max(1e-9);

    let mut report = SearchReport {
        algorithm: backend.algorithm().name().to_string(),
        status: SearchStatus::Exhausted,
        nonce: None,
        hash: None,
        target,
        hashes,
        elapsed_secs,
        hashrate: hashes as f64 / elapsed_secs,
    };

    match outcome {
        Some(Ok(share)) => {
            log::info!("✅ Share found: nonce {} after {} hashes", share.nonce, hashes);
            report.status = SearchStatus::Found;
            report.nonce = Some(share.nonce);
            report.hash = Some(zion_pow::bytes_to_hex(&share.hash));
        }
        Some(Err(e)) => {
            log::error!("❌ Search aborted: {}", e);
            return Err(e);
        }
        None if past_deadline() && hashes < max_nonces => {
            log::warn!("⏳ Deadline reached after {} hashes", hashes);
            report.status = SearchStatus::TimedOut;
        }
        None => {
            log::warn!("⚠️  Nonce range exhausted without a share");
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zion_pow::{meets_target, CosmicHarmony, YescryptEngine, YescryptParams};

    fn params(threads: usize, max_nonces: u64, timeout: Duration) -> SearchParams {
        SearchParams {
            threads,
            start_nonce: 0,
            max_nonces,
            timeout,
        }
    }

    #[test]
    fn test_partition_is_disjoint_and_complete() {
        let ranges = partition(10, 3);
        assert_eq!(ranges, vec![(0, 4), (4, 7), (7, 10)]);

        let ranges = partition(1u64 << 32, 7);
        assert_eq!(ranges.len(), 7);
        assert_eq!(ranges[0].0, 0);
        assert_eq!(ranges[6].1, 1u64 << 32);
        for w in ranges.windows(2) {
            assert_eq!(w[0].1, w[1].0);
        }

        // more threads than nonces
        assert_eq!(partition(2, 8), vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn test_finds_share_with_easy_target() {
        let backend = CosmicHarmony::new();
        let header = [7u8; 80];
        let report = run(&backend, &header, 1u64 << 60, &params(4, 1 << 16, Duration::from_secs(30))).unwrap();

        assert_eq!(report.status, SearchStatus::Found);
        let nonce = report.nonce.unwrap();
        let hash = backend.hash_nonce(&header, nonce).unwrap();
        assert!(meets_target(&hash, 1u64 << 60));
        assert_eq!(report.hash.unwrap(), zion_pow::bytes_to_hex(&hash));
    }

    #[test]
    fn test_exhausts_small_range() {
        let backend = CosmicHarmony::new();
        let report = run(&backend, b"header", 1, &params(3, 100, Duration::from_secs(30))).unwrap();
        assert_eq!(report.status, SearchStatus::Exhausted);
        assert_eq!(report.hashes, 100);
        assert!(report.nonce.is_none());
    }

    #[test]
    fn test_deadline_stops_search() {
        let backend = CosmicHarmony::new();
        let started = Instant::now();
        let report = run(&backend, b"header", 1, &params(2, 1u64 << 32, Duration::from_millis(200))).unwrap();
        assert_eq!(report.status, SearchStatus::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(report.hashes < 1u64 << 32);
    }

    #[test]
    fn test_unbounded_timeout_does_not_overflow() {
        let backend = CosmicHarmony::new();
        let forever = Duration::from_secs(u64::MAX);
        let report = run(&backend, b"header", 1, &params(2, 50, forever)).unwrap();
        assert_eq!(report.status, SearchStatus::Exhausted);
        assert_eq!(report.hashes, 50);

        let report = run(&backend, b"header", 1, &params(1, 5, Duration::MAX)).unwrap();
        assert_eq!(report.status, SearchStatus::Exhausted);
    }

    #[test]
    fn test_backend_error_aborts_search() {
        let engine = YescryptEngine::new();
        engine.init(YescryptParams::new(256, 1, 1), 1).unwrap();
        engine.cleanup();
        let result = run(&engine, b"header", u64::MAX, &params(2, 10, Duration::from_secs(5)));
        assert!(matches!(result, Err(PowError::NotInitialized { .. })));
    }
}
