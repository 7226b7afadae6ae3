//! Configuration management for the ZION miner CLI
//!
//! Loaded from a TOML file; CLI flags override file values afterwards.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use zion_pow::{Algorithm, GpuConfig, RandomXConfig, YescryptParams};

/// Miner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Hashing backend
    #[serde(default)]
    pub algorithm: Algorithm,

    /// Worker threads (0 = auto-detect)
    #[serde(default)]
    pub threads: usize,

    /// Block header / job blob, hex
    #[serde(default = "default_header_hex")]
    pub header_hex: String,

    /// Share target (big-endian leading u64 of the hash must be below it)
    #[serde(default = "default_target")]
    pub target: u64,

    /// RandomX key (seed hash), hex
    #[serde(default = "default_seed_hex")]
    pub seed_hex: String,

    #[serde(default)]
    pub yescrypt: YescryptParams,

    #[serde(default)]
    pub randomx: RandomXConfig,

    #[serde(default)]
    pub gpu: GpuConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// First nonce tried
    #[serde(default)]
    pub start_nonce: u32,

    /// Nonces to scan across all threads (capped at 2^32)
    #[serde(default = "default_max_nonces")]
    pub max_nonces: u64,

    /// Stop submitting nonces after this many seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            start_nonce: 0,
            max_nonces: default_max_nonces(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            threads: 0,
            header_hex: default_header_hex(),
            target: default_target(),
            seed_hex: default_seed_hex(),
            yescrypt: YescryptParams::default(),
            randomx: RandomXConfig::default(),
            gpu: GpuConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl MinerConfig {
    /// Load config from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: MinerConfig = toml::from_str(&content).context("Failed to parse config TOML")?;

        Ok(config)
    }

    /// Save config as TOML
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path.as_ref(), text).context("Failed to write config file")?;

        Ok(())
    }

    /// Resolved worker thread count
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get().max(1)
        } else {
            self.threads
        }
    }

    pub fn header(&self) -> Result<Vec<u8>> {
        zion_pow::hex_to_bytes(&self.header_hex).context("Invalid header hex")
    }

    pub fn seed(&self) -> Result<Vec<u8>> {
        zion_pow::hex_to_bytes(&self.seed_hex).context("Invalid RandomX seed hex")
    }

    /// RandomX settings with the miner's thread count and env overrides applied
    pub fn randomx_config(&self) -> RandomXConfig {
        RandomXConfig {
            threads: self.effective_threads(),
            ..self.randomx.clone()
        }
        .with_env_overrides()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.header()?;

        if self.algorithm == Algorithm::Autolykos
            && self.header()?.len() > zion_pow::autolykos::K_MAX_INPUT_BYTES
        {
            anyhow::bail!(
                "Autolykos header must be at most {} bytes",
                zion_pow::autolykos::K_MAX_INPUT_BYTES
            );
        }

        if self.algorithm == Algorithm::RandomX && self.seed()?.is_empty() {
            anyhow::bail!("RandomX requires a non-empty seed_hex");
        }

        if self.target == 0 {
            anyhow::bail!("Target 0 can never be met");
        }

        if self.search.max_nonces == 0 || self.search.max_nonces > 1u64 << 32 {
            anyhow::bail!("search.max_nonces must be in 1..=2^32");
        }

        self.yescrypt.validate().context("Invalid [yescrypt] section")?;
        self.randomx.validate().context("Invalid [randomx] section")?;
        self.gpu.validate().context("Invalid [gpu] section")?;

        Ok(())
    }
}

// Default value functions
fn default_header_hex() -> String {
    "00".repeat(80)
}

fn default_target() -> u64 {
    1 << 56
}

fn default_seed_hex() -> String {
    hex::encode(b"ZION RandomX seed")
}

fn default_max_nonces() -> u64 {
    1 << 32
}

fn default_timeout_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MinerConfig::default();
        assert_eq!(config.algorithm, Algorithm::CosmicHarmony);
        assert_eq!(config.threads, 0);
        assert_eq!(config.header().unwrap().len(), 80);
        assert!(config.effective_threads() >= 1);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: MinerConfig = toml::from_str(
            r#"
            algorithm = "yescrypt"
            threads = 4
            header_hex = "deadbeef"

            [yescrypt]
            n = 1024

            [search]
            timeout_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.algorithm, Algorithm::Yescrypt);
        assert_eq!(config.effective_threads(), 4);
        assert_eq!(config.header().unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(config.yescrypt, YescryptParams::new(1024, 8, 1));
        assert_eq!(config.search.timeout_secs, 5);
        assert_eq!(config.search.max_nonces, 1 << 32);
        config.validate().unwrap();
    }

    #[test]
    fn test_config_validation() {
        let mut config = MinerConfig::default();

        config.header_hex = "abc".into();
        assert!(config.validate().is_err());

        config.header_hex = "00".repeat(193);
        config.algorithm = Algorithm::Autolykos;
        assert!(config.validate().is_err());

        config.header_hex = "00".repeat(192);
        config.validate().unwrap();

        config.target = 0;
        assert!(config.validate().is_err());
        config.target = u64::MAX;

        config.yescrypt.n = 1000;
        assert!(config.validate().is_err());
        config.yescrypt.n = 1024;

        config.search.max_nonces = (1 << 32) + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("miner.toml");

        let mut config = MinerConfig::default();
        config.algorithm = Algorithm::Autolykos;
        config.target = 12345;
        config.save(&path).unwrap();

        let loaded = MinerConfig::from_file(&path).unwrap();
        assert_eq!(loaded.algorithm, Algorithm::Autolykos);
        assert_eq!(loaded.target, 12345);
        assert_eq!(loaded.randomx, config.randomx);
    }
}
