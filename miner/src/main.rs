mod bench;
mod config;
mod report;
mod search;
mod selftest;

use clap::{Args, Parser, Subcommand};
use colored::*;
use log::{info, warn};
use std::time::Duration;

use config::MinerConfig;
use zion_pow::Algorithm;

#[derive(Parser, Debug)]
#[command(
    name = "zion-miner",
    version = "2.9.5",
    author = "ZION Core Team",
    about = "🌟 ZION PoW Miner - benchmark, nonce search and self-test",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file path (TOML)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Measure hashes/second for one algorithm
    Bench {
        #[command(flatten)]
        common: CommonArgs,

        /// Hashes to compute across all threads
        #[arg(long, default_value_t = 1000)]
        hashes: u64,

        /// Run Autolykos on the GPU (requires the `gpu` feature)
        #[arg(long)]
        gpu: bool,
    },

    /// Scan nonces until a hash meets the target or the deadline passes
    Search {
        #[command(flatten)]
        common: CommonArgs,

        /// Header / job blob, hex
        #[arg(long)]
        header: Option<String>,

        /// Share target (u64, decimal or 0x-prefixed hex)
        #[arg(long, value_parser = parse_target)]
        target: Option<u64>,

        /// RandomX seed, hex
        #[arg(long)]
        seed: Option<String>,

        /// First nonce
        #[arg(long)]
        start_nonce: Option<u32>,

        /// Nonces to scan across all threads
        #[arg(long)]
        max_nonces: Option<u64>,

        /// Stop after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Run the built-in hashing scenarios; exits non-zero on failure
    Selftest,

    /// Print the Autolykos OpenCL kernel source
    Kernel,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Mining algorithm (cosmic_harmony, yescrypt, randomx, autolykos)
    #[arg(short, long)]
    algorithm: Option<String>,

    /// Number of CPU threads (0 = auto-detect)
    #[arg(short, long)]
    threads: Option<usize>,
}

fn parse_target(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid target '{}': {}", s, e))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.debug {
        log::LevelFilter::Debug
    } else if cli.quiet {
        log::LevelFilter::Warn
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env().filter_level(level).init();

    if cli.no_color || cli.json {
        colored::control::set_override(false);
    }

    let mut config = match &cli.config {
        Some(path) => MinerConfig::from_file(path)?,
        None => MinerConfig::default(),
    };

    if !cli.json && !cli.quiet && !matches!(cli.command, Command::Kernel) {
        report::print_banner();
    }

    match cli.command {
        Command::Kernel => {
            print!("{}", zion_pow::autolykos::get_kernel_source());
            Ok(())
        }

        Command::Selftest => {
            let results = selftest::run_all();
            if cli.json {
                report::print_json(&results)?;
            } else {
                report::print_selftest(&results);
            }
            if results.iter().any(|r| !r.passed) {
                anyhow::bail!("self-test failed");
            }
            info!("✅ All self-test checks passed");
            Ok(())
        }

        Command::Bench { common, hashes, gpu } => {
            apply_common(&mut config, &common)?;
            config.validate()?;

            let result = if gpu {
                if config.algorithm != Algorithm::Autolykos {
                    warn!("⚠️  --gpu only applies to autolykos, benchmarking autolykos");
                }
                bench::run_gpu(&config, hashes)?
            } else {
                bench::run(&config, hashes)?
            };

            if cli.json {
                report::print_json(&result)?;
            } else {
                report::print_bench(&result);
            }
            Ok(())
        }

        Command::Search {
            common,
            header,
            target,
            seed,
            start_nonce,
            max_nonces,
            timeout_secs,
        } => {
            apply_common(&mut config, &common)?;
            if let Some(header) = header {
                config.header_hex = header;
            }
            if let Some(target) = target {
                config.target = target;
            }
            if let Some(seed) = seed {
                config.seed_hex = seed;
            }
            if let Some(start) = start_nonce {
                config.search.start_nonce = start;
            }
            if let Some(max) = max_nonces {
                config.search.max_nonces = max;
            }
            if let Some(secs) = timeout_secs {
                config.search.timeout_secs = secs;
            }
            config.validate()?;

            let backend = bench::build_backend(&config)?;
            let params = search::SearchParams {
                threads: config.effective_threads(),
                start_nonce: config.search.start_nonce,
                max_nonces: config.search.max_nonces,
                timeout: Duration::from_secs(config.search.timeout_secs),
            };
            let result = search::run(backend.as_ref(), &config.header()?, config.target, &params)?;

            if cli.json {
                report::print_json(&result)?;
            } else {
                report::print_search(&result);
            }
            Ok(())
        }
    }
}

fn apply_common(config: &mut MinerConfig, common: &CommonArgs) -> anyhow::Result<()> {
    if let Some(name) = &common.algorithm {
        config.algorithm = Algorithm::from_str(name)
            .ok_or_else(|| anyhow::anyhow!("Invalid algorithm: {}", name))?;
    }
    if let Some(threads) = common.threads {
        config.threads = threads;
    }
    info!(
        "{} {} on {} threads",
        "algorithm".bright_black(),
        config.algorithm.name().bright_cyan(),
        config.effective_threads()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("1000"), Ok(1000));
        assert_eq!(parse_target("0x0100000000000000"), Ok(1 << 56));
        assert_eq!(parse_target("0XFF"), Ok(255));
        assert!(parse_target("nope").is_err());
    }

    #[test]
    fn test_search_flags_parse() {
        let cli = Cli::try_parse_from([
            "zion-miner",
            "--json",
            "search",
            "--algorithm",
            "autolykos",
            "--header",
            "deadbeef",
            "--target",
            "0xffff",
            "--timeout-secs",
            "3",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Command::Search { common, header, target, timeout_secs, .. } => {
                assert_eq!(common.algorithm.as_deref(), Some("autolykos"));
                assert_eq!(header.as_deref(), Some("deadbeef"));
                assert_eq!(target, Some(0xffff));
                assert_eq!(timeout_secs, Some(3));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_apply_common_rejects_unknown_algorithm() {
        let mut config = MinerConfig::default();
        let common = CommonArgs {
            algorithm: Some("sha256d".into()),
            threads: None,
        };
        assert!(apply_common(&mut config, &common).is_err());

        let common = CommonArgs {
            algorithm: Some("randomx".into()),
            threads: Some(2),
        };
        apply_common(&mut config, &common).unwrap();
        assert_eq!(config.algorithm, Algorithm::RandomX);
        assert_eq!(config.threads, 2);
    }
}
