//! Engine configuration.
//!
//! Plain serde structs with defaults so the miner can load them from TOML and
//! embedders can build them in code.

use serde::{Deserialize, Serialize};

use crate::error::{PowError, Result};

/// Env var: non-empty and not `"0"` forces cache-only RandomX.
pub const ENV_RANDOMX_LIGHT: &str = "ZION_RANDOMX_LIGHT";
/// Env var: `"0"` disables the full-memory dataset.
pub const ENV_RANDOMX_FULL_MEM: &str = "ZION_RANDOMX_FULL_MEM";

/// Hard ceiling on RandomX VM slots.
pub const RANDOMX_MAX_THREADS: usize = 64;

// ---------------------------------------------------------------------------
// Yescrypt
// ---------------------------------------------------------------------------

/// Memory-hard KDF parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YescryptParams {
    /// CPU/memory cost, power of two
    #[serde(default = "default_n")]
    pub n: u64,
    /// Block size
    #[serde(default = "default_r")]
    pub r: u32,
    /// Parallelism
    #[serde(default = "default_p")]
    pub p: u32,
}

fn default_n() -> u64 {
    4096
}
fn default_r() -> u32 {
    8
}
fn default_p() -> u32 {
    1
}

impl Default for YescryptParams {
    fn default() -> Self {
        Self {
            n: default_n(),
            r: default_r(),
            p: default_p(),
        }
    }
}

impl YescryptParams {
    pub fn new(n: u64, r: u32, p: u32) -> Self {
        Self { n, r, p }
    }

    pub fn validate(&self) -> Result<()> {
        if self.n < 2 || !self.n.is_power_of_two() {
            return Err(PowError::InvalidParams(format!(
                "N must be a power of two >= 2, got {}",
                self.n
            )));
        }
        if self.r == 0 {
            return Err(PowError::InvalidParams("r must be >= 1".into()));
        }
        if self.p == 0 {
            return Err(PowError::InvalidParams("p must be >= 1".into()));
        }
        Ok(())
    }

    /// `log2(N)`, as the KDF takes it.
    pub fn log_n(&self) -> u8 {
        self.n.trailing_zeros() as u8
    }
}

// ---------------------------------------------------------------------------
// RandomX
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryMode {
    /// Build the ~2 GB dataset, fall back to light on allocation failure
    Full,
    /// Cache only
    Light,
}

impl Default for MemoryMode {
    fn default() -> Self {
        MemoryMode::Full
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomXConfig {
    /// VM slots (clamped to `[1, 64]` at init)
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default)]
    pub memory_mode: MemoryMode,
    /// Try large pages first, retry without on failure
    #[serde(default = "default_true")]
    pub large_pages: bool,
    #[serde(default = "default_max_dataset_init_threads")]
    pub max_dataset_init_threads: usize,
}

fn default_threads() -> usize {
    num_cpus::get().max(1)
}
fn default_true() -> bool {
    true
}
fn default_max_dataset_init_threads() -> usize {
    32
}

impl Default for RandomXConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            memory_mode: MemoryMode::default(),
            large_pages: true,
            max_dataset_init_threads: default_max_dataset_init_threads(),
        }
    }
}

impl RandomXConfig {
    pub fn with_threads(threads: usize) -> Self {
        Self {
            threads,
            ..Self::default()
        }
    }

    pub fn light(threads: usize) -> Self {
        Self {
            threads,
            memory_mode: MemoryMode::Light,
            ..Self::default()
        }
    }

    /// Apply `ZION_RANDOMX_LIGHT` / `ZION_RANDOMX_FULL_MEM` from the process env.
    pub fn with_env_overrides(self) -> Self {
        let light = std::env::var(ENV_RANDOMX_LIGHT).ok();
        let full_mem = std::env::var(ENV_RANDOMX_FULL_MEM).ok();
        self.apply_overrides(light.as_deref(), full_mem.as_deref())
    }

    /// Override rule behind [`with_env_overrides`](Self::with_env_overrides).
    pub fn apply_overrides(mut self, light: Option<&str>, full_mem: Option<&str>) -> Self {
        let force_light = matches!(light, Some(v) if !v.is_empty() && v != "0");
        let full_disabled = matches!(full_mem, Some("0"));
        if force_light || full_disabled {
            self.memory_mode = MemoryMode::Light;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_dataset_init_threads == 0 {
            return Err(PowError::InvalidParams(
                "max_dataset_init_threads must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// GPU
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuConfig {
    /// Index into the platform's GPU device list
    #[serde(default)]
    pub device_id: usize,
    /// Local work size; 0 lets the driver choose
    #[serde(default = "default_work_group_size")]
    pub work_group_size: usize,
    /// Nonces per kernel dispatch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_work_group_size() -> usize {
    256
}
fn default_batch_size() -> usize {
    1 << 20
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            work_group_size: default_work_group_size(),
            batch_size: default_batch_size(),
        }
    }
}

impl GpuConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PowError::InvalidParams("batch_size must be >= 1".into()));
        }
        if self.work_group_size != 0 && self.batch_size % self.work_group_size != 0 {
            return Err(PowError::InvalidParams(format!(
                "batch_size {} is not a multiple of work_group_size {}",
                self.batch_size, self.work_group_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yescrypt_defaults() {
        let p = YescryptParams::default();
        assert_eq!((p.n, p.r, p.p), (4096, 8, 1));
        assert_eq!(p.log_n(), 12);
        p.validate().unwrap();
    }

    #[test]
    fn test_yescrypt_validation() {
        assert!(YescryptParams::new(3000, 8, 1).validate().is_err());
        assert!(YescryptParams::new(1, 8, 1).validate().is_err());
        assert!(YescryptParams::new(1024, 0, 1).validate().is_err());
        assert!(YescryptParams::new(1024, 1, 0).validate().is_err());
        assert!(YescryptParams::new(2, 1, 1).validate().is_ok());
    }

    #[test]
    fn test_env_override_rule() {
        let base = RandomXConfig::with_threads(2);
        assert_eq!(base.clone().apply_overrides(None, None).memory_mode, MemoryMode::Full);
        assert_eq!(base.clone().apply_overrides(Some("1"), None).memory_mode, MemoryMode::Light);
        assert_eq!(base.clone().apply_overrides(Some("yes"), None).memory_mode, MemoryMode::Light);
        assert_eq!(base.clone().apply_overrides(Some("0"), None).memory_mode, MemoryMode::Full);
        assert_eq!(base.clone().apply_overrides(Some(""), None).memory_mode, MemoryMode::Full);
        assert_eq!(base.clone().apply_overrides(None, Some("0")).memory_mode, MemoryMode::Light);
        assert_eq!(base.apply_overrides(None, Some("1")).memory_mode, MemoryMode::Full);
    }

    #[test]
    fn test_light_never_upgraded_by_env() {
        let cfg = RandomXConfig::light(1).apply_overrides(Some("0"), Some("1"));
        assert_eq!(cfg.memory_mode, MemoryMode::Light);
    }

    #[test]
    fn test_gpu_validation() {
        GpuConfig::default().validate().unwrap();
        let bad = GpuConfig { batch_size: 1000, work_group_size: 256, ..GpuConfig::default() };
        assert!(bad.validate().is_err());
        let auto = GpuConfig { batch_size: 1000, work_group_size: 0, ..GpuConfig::default() };
        assert!(auto.validate().is_ok());
    }

    #[test]
    fn test_serde_defaults_fill_missing_fields() {
        let cfg: RandomXConfig = serde_json::from_str(r#"{"threads": 3, "memory_mode": "light"}"#).unwrap();
        assert_eq!(cfg.threads, 3);
        assert_eq!(cfg.memory_mode, MemoryMode::Light);
        assert!(cfg.large_pages);
        assert_eq!(cfg.max_dataset_init_threads, 32);
    }
}
