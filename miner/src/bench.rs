//! Backend construction and hashrate benchmarks

use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Instant;

use zion_pow::{Algorithm, AutolykosCpu, AutolykosGpu, CosmicHarmony, PowBackend, YescryptEngine};

use crate::config::MinerConfig;
use crate::search::partition;

#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub algorithm: String,
    pub device: String,
    pub threads: usize,
    pub hashes: u64,
    pub elapsed_secs: f64,
    pub hashrate: f64,
}

/// Initialise the configured backend. Fails rather than handing back a
/// partially initialised engine.
pub fn build_backend(config: &MinerConfig) -> Result<Box<dyn PowBackend>> {
    let threads = config.effective_threads();
    let backend: Box<dyn PowBackend> = match config.algorithm {
        Algorithm::CosmicHarmony => Box::new(CosmicHarmony::new()),
        Algorithm::Yescrypt => {
            let engine = YescryptEngine::new();
            engine
                .init(config.yescrypt, threads)
                .context("Yescrypt init failed")?;
            Box::new(engine)
        }
        Algorithm::RandomX => build_randomx(config)?,
        Algorithm::Autolykos => Box::new(AutolykosCpu),
    };
    Ok(backend)
}

#[cfg(feature = "randomx")]
fn build_randomx(config: &MinerConfig) -> Result<Box<dyn PowBackend>> {
    let engine = zion_pow::RandomXEngine::new();
    let status = engine
        .init(&config.seed()?, &config.randomx_config())
        .context("RandomX init failed")?;
    log::info!(
        "RandomX ready: {} VMs, {} mode",
        status.threads,
        if status.full_memory { "full" } else { "light" }
    );
    Ok(Box::new(engine))
}

#[cfg(not(feature = "randomx"))]
fn build_randomx(_config: &MinerConfig) -> Result<Box<dyn PowBackend>> {
    anyhow::bail!("RandomX support not compiled. Rebuild with --features randomx")
}

/// Hash `hashes` nonces over the configured header on every worker thread.
pub fn run(config: &MinerConfig, hashes: u64) -> Result<BenchReport> {
    let header = config.header()?;
    let threads = config.effective_threads();

    if config.algorithm == Algorithm::Yescrypt {
        return run_yescrypt(config, hashes, threads);
    }

    let backend = build_backend(config)?;
    let ranges = partition(hashes.max(1), threads);

    log::info!(
        "🚀 Benchmarking {} ({} hashes, {} threads)",
        config.algorithm,
        hashes,
        ranges.len()
    );

    let start = Instant::now();
    std::thread::scope(|scope| -> Result<()> {
        let workers: Vec<_> = ranges
            .iter()
            .map(|&(begin, end)| {
                let backend = &backend;
                let header = &header;
                scope.spawn(move || -> zion_pow::Result<()> {
                    for nonce in begin..end {
                        backend.hash_nonce(header, nonce as u32)?;
                    }
                    Ok(())
                })
            })
            .collect();
        for worker in workers {
            worker
                .join()
                .map_err(|_| anyhow::anyhow!("benchmark thread panicked"))??;
        }
        Ok(())
    })?;
    let elapsed_secs = start.elapsed().as_secs_f64().max(1e-9);
    let total: u64 = ranges.iter().map(|(b, e)| e - b).sum();

    Ok(BenchReport {
        algorithm: config.algorithm.name().to_string(),
        device: "cpu".to_string(),
        threads: ranges.len(),
        hashes: total,
        elapsed_secs,
        hashrate: total as f64 / elapsed_secs,
    })
}

/// One `benchmark()` per slot, run concurrently; rates add up.
fn run_yescrypt(config: &MinerConfig, hashes: u64, threads: usize) -> Result<BenchReport> {
    let engine = YescryptEngine::new();
    engine
        .init(config.yescrypt, threads)
        .context("Yescrypt init failed")?;

    let per_slot = u32::try_from((hashes / threads as u64).max(1)).unwrap_or(u32::MAX);
    log::info!(
        "🚀 Benchmarking yescrypt N={} r={} p={} ({} hashes x {} slots)",
        config.yescrypt.n,
        config.yescrypt.r,
        config.yescrypt.p,
        per_slot,
        threads
    );

    let start = Instant::now();
    let rates = std::thread::scope(|scope| -> Result<Vec<f64>> {
        let workers: Vec<_> = (0..threads)
            .map(|slot| {
                let engine = &engine;
                scope.spawn(move || engine.benchmark(slot, per_slot))
            })
            .collect();
        workers
            .into_iter()
            .map(|w| {
                w.join()
                    .map_err(|_| anyhow::anyhow!("benchmark thread panicked"))?
                    .map_err(anyhow::Error::from)
            })
            .collect()
    })?;
    let elapsed_secs = start.elapsed().as_secs_f64().max(1e-9);
    engine.cleanup();

    Ok(BenchReport {
        algorithm: config.algorithm.name().to_string(),
        device: "cpu".to_string(),
        threads,
        hashes: per_slot as u64 * threads as u64,
        elapsed_secs,
        hashrate: rates.iter().sum(),
    })
}

/// Autolykos on the configured GPU, `batch_size` nonces per dispatch.
pub fn run_gpu(config: &MinerConfig, hashes: u64) -> Result<BenchReport> {
    let header = config.header()?;
    let gpu = AutolykosGpu::new(config.gpu.clone()).context("GPU init failed")?;

    let batch = config.gpu.batch_size.max(1);
    let mut done = 0u64;
    let mut nonces = Vec::with_capacity(batch);

    let start = Instant::now();
    while done < hashes.max(1) {
        let n = ((hashes - done) as usize).clamp(1, batch);
        nonces.clear();
        nonces.extend((0..n as u64).map(|i| (done + i) as u32));
        gpu.hash_batch(&header, &nonces)?;
        done += n as u64;
    }
    let elapsed_secs = start.elapsed().as_secs_f64().max(1e-9);

    Ok(BenchReport {
        algorithm: Algorithm::Autolykos.name().to_string(),
        device: gpu.device_name().to_string(),
        threads: 1,
        hashes: done,
        elapsed_secs,
        hashrate: done as f64 / elapsed_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use zion_pow::YescryptParams;

    fn config(algorithm: Algorithm, threads: usize) -> MinerConfig {
        MinerConfig {
            algorithm,
            threads,
            yescrypt: YescryptParams::new(256, 1, 1),
            ..MinerConfig::default()
        }
    }

    #[test]
    fn test_cpu_bench_counts_every_hash() {
        let report = run(&config(Algorithm::CosmicHarmony, 3), 100).unwrap();
        assert_eq!(report.hashes, 100);
        assert_eq!(report.threads, 3);
        assert!(report.hashrate > 0.0);

        let report = run(&config(Algorithm::Autolykos, 2), 10).unwrap();
        assert_eq!(report.hashes, 10);
    }

    #[test]
    fn test_yescrypt_bench_uses_engine_benchmark() {
        let report = run(&config(Algorithm::Yescrypt, 2), 8).unwrap();
        assert_eq!(report.algorithm, "yescrypt");
        assert_eq!(report.hashes, 8);
        assert!(report.hashrate > 0.0);
    }

    #[test]
    fn test_build_backend_matches_algorithm() {
        for algo in [Algorithm::CosmicHarmony, Algorithm::Yescrypt, Algorithm::Autolykos] {
            let backend = build_backend(&config(algo, 1)).unwrap();
            assert_eq!(backend.algorithm(), algo);
        }
    }

    #[test]
    fn test_bad_yescrypt_params_fail_init() {
        let mut cfg = config(Algorithm::Yescrypt, 1);
        cfg.yescrypt.n = 3;
        assert!(build_backend(&cfg).is_err());
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn test_gpu_bench_without_feature() {
        assert!(run_gpu(&MinerConfig::default(), 1).is_err());
    }
}
