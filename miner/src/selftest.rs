//! End-to-end checks of the hashing core, run the way a mining client uses it

use serde::Serialize;

use zion_pow::autolykos::{autolykos_hash, autolykos_hash_mirror};
use zion_pow::{cosmic_harmony, meets_target, yescrypt, YescryptParams};

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    fn from_outcome(name: &'static str, outcome: anyhow::Result<String>) -> Self {
        match outcome {
            Ok(detail) => Self { name, passed: true, detail },
            Err(e) => Self {
                name,
                passed: false,
                detail: format!("{e:#}"),
            },
        }
    }
}

/// Run every check; stops at the first failure.
pub fn run_all() -> Vec<CheckResult> {
    let checks: Vec<(&'static str, fn() -> anyhow::Result<String>)> = vec![
        ("cosmic_harmony", check_cosmic_harmony),
        ("yescrypt", check_yescrypt),
        ("randomx", check_randomx),
        ("autolykos", check_autolykos),
    ];

    let mut results = Vec::with_capacity(checks.len());
    for (name, check) in checks {
        let result = CheckResult::from_outcome(name, check());
        let failed = !result.passed;
        results.push(result);
        if failed {
            break;
        }
    }
    results
}

fn check_cosmic_harmony() -> anyhow::Result<String> {
    anyhow::ensure!(cosmic_harmony::initialize(), "initialize() returned false");

    let first = cosmic_harmony::cosmic_hash(b"", 0);
    let second = cosmic_harmony::cosmic_hash(b"", 0);
    anyhow::ensure!(first == second, "cosmic_hash(\"\", 0) is not deterministic");

    Ok(format!(
        "cosmic_hash(\"\", 0) = {} [{}]",
        zion_pow::bytes_to_hex(&first),
        cosmic_harmony::simd_level().map_or("?", |l| l.name())
    ))
}

fn check_yescrypt() -> anyhow::Result<String> {
    let engine = yescrypt::global();
    engine.init(YescryptParams::new(4096, 8, 1), 4)?;
    // second init with the same params is a no-op
    engine.init(YescryptParams::new(4096, 8, 1), 4)?;
    anyhow::ensure!(engine.num_threads() == 4, "expected 4 slots, got {}", engine.num_threads());

    let hash = engine.hash_auto(b"Hello ZION")?;
    anyhow::ensure!(hash != [0u8; 32], "hash is all zero");
    anyhow::ensure!(
        meets_target(&hash, u64::MAX),
        "hash fails the trivial maximum target"
    );

    let hex = zion_pow::bytes_to_hex(&hash);
    anyhow::ensure!(zion_pow::hash_from_hex(&hex)? == hash, "hex round-trip mismatch");

    engine.cleanup();
    anyhow::ensure!(engine.num_threads() == 0, "slots remain after cleanup");

    Ok(format!("hash(\"Hello ZION\") = {hex}"))
}

#[cfg(feature = "randomx")]
fn check_randomx() -> anyhow::Result<String> {
    use zion_pow::RandomXConfig;

    let engine = zion_pow::RandomXEngine::new();
    // light mode keeps the self-test under a few hundred MB
    let config = RandomXConfig {
        large_pages: false,
        ..RandomXConfig::light(2)
    };
    engine.init(b"seed", &config)?;

    let mut a = [0u8; 80];
    let mut b = [0u8; 80];
    a[38] = 1;
    b[38] = 2;

    let (ha, hb) = std::thread::scope(|scope| {
        let ta = scope.spawn(|| engine.hash_vm(0, &a));
        let tb = scope.spawn(|| engine.hash_vm(1, &b));
        (ta.join(), tb.join())
    });
    let ha = ha.map_err(|_| anyhow::anyhow!("hash thread panicked"))??;
    let hb = hb.map_err(|_| anyhow::anyhow!("hash thread panicked"))??;

    anyhow::ensure!(ha != hb, "different nonces produced the same hash");
    anyhow::ensure!(engine.hash_vm(0, &a)? == ha, "VM 0 is not deterministic");
    anyhow::ensure!(engine.hash_vm(1, &b)? == hb, "VM 1 is not deterministic");
    anyhow::ensure!(engine.hash_vm(1, &a)? == ha, "VMs disagree on the same input");

    engine.cleanup();
    Ok(format!("2 VMs, light mode, {}", zion_pow::bytes_to_hex(&ha)))
}

#[cfg(not(feature = "randomx"))]
fn check_randomx() -> anyhow::Result<String> {
    Ok("skipped (built without randomx)".to_string())
}

fn check_autolykos() -> anyhow::Result<String> {
    let reference = autolykos_hash(b"", 0)?;
    let mirror = autolykos_hash_mirror(b"", 0)?;
    anyhow::ensure!(reference == mirror, "kernel Blake2b mirror disagrees with blake2");

    match zion_pow::AutolykosGpu::new(Default::default()) {
        Ok(gpu) => {
            let device = gpu.hash_single(b"", 0)?;
            anyhow::ensure!(device == reference, "GPU output differs from CPU reference");
            Ok(format!("GPU/CPU parity on {}", gpu.device_name()))
        }
        Err(e) => {
            log::debug!("GPU parity skipped: {}", e);
            Ok(format!("CPU/mirror parity, {}", zion_pow::bytes_to_hex(&reference)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_checks_pass() {
        assert!(check_cosmic_harmony().is_ok());
        assert!(check_autolykos().is_ok());
    }

    #[test]
    fn test_run_all_passes() {
        let results = run_all();
        for r in &results {
            assert!(r.passed, "{}: {}", r.name, r.detail);
        }
        assert_eq!(results.len(), 4);
    }

    #[test]
    fn test_failure_detail_is_kept() {
        let r = CheckResult::from_outcome("x", Err(anyhow::anyhow!("boom")));
        assert!(!r.passed);
        assert_eq!(r.detail, "boom");
    }
}
