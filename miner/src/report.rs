//! Terminal and JSON output

use colored::*;
use serde::Serialize;

use crate::bench::BenchReport;
use crate::search::{SearchReport, SearchStatus};
use crate::selftest::CheckResult;

pub fn format_hashrate(rate: f64) -> String {
    if rate >= 1_000_000.0 {
        format!("{:.2} MH/s", rate / 1_000_000.0)
    } else if rate >= 1_000.0 {
        format!("{:.2} kH/s", rate / 1_000.0)
    } else {
        format!("{:.1} H/s", rate)
    }
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn row(label: &str, value: impl std::fmt::Display) {
    println!("{}  {:<12} {}", "   ".bright_black(), label.bright_black(), value);
}

pub fn print_bench(report: &BenchReport) {
    println!("{} {}", " * ".bright_green().bold(), "BENCHMARK".bright_white().bold());
    row("algorithm", report.algorithm.bright_cyan());
    row("device", report.device.bright_white());
    row("threads", report.threads.to_string().bright_magenta().bold());
    row("hashes", report.hashes);
    row("elapsed", format!("{:.3}s", report.elapsed_secs));
    row("hashrate", format_hashrate(report.hashrate).bright_green().bold());
    println!();
}

pub fn print_search(report: &SearchReport) {
    println!("{} {}", " * ".bright_green().bold(), "SEARCH".bright_white().bold());
    row("algorithm", report.algorithm.bright_cyan());
    row("target", format!("0x{:016x}", report.target));
    let status = match report.status {
        SearchStatus::Found => "FOUND".bright_green().bold(),
        SearchStatus::Exhausted => "EXHAUSTED".bright_yellow().bold(),
        SearchStatus::TimedOut => "TIMED OUT".bright_yellow().bold(),
    };
    row("status", status);
    if let (Some(nonce), Some(hash)) = (report.nonce, report.hash.as_ref()) {
        row("nonce", format!("{} (0x{:08x})", nonce, nonce).bright_magenta().bold());
        row("hash", hash.bright_white());
    }
    row("hashes", report.hashes);
    row("hashrate", format_hashrate(report.hashrate).bright_green());
    println!();
}

pub fn print_selftest(results: &[CheckResult]) {
    println!("{} {}", " * ".bright_green().bold(), "SELF-TEST".bright_white().bold());
    for r in results {
        let mark = if r.passed { "PASS".bright_green().bold() } else { "FAIL".bright_red().bold() };
        println!(
            "{}  {:<16} {} {}",
            "   ".bright_black(),
            r.name.bright_white(),
            mark,
            r.detail.bright_black()
        );
    }
    println!();
}

fn banner_row(text: ColoredString) -> String {
    format!("{}{}{}", " ║ ".bright_cyan(), text, " ║".bright_cyan())
}

fn banner_lines() -> Vec<String> {
    vec![
        " ╔══════════════════════════════════════════════════════════════════╗"
            .bright_cyan()
            .to_string(),
        banner_row(
            "       ZION POW MINER  v2.9.5  TerraNova                        "
                .bright_white()
                .bold(),
        ),
        banner_row(
            "       Benchmark  ·  Nonce Search  ·  Self-Test                 ".bright_black(),
        ),
        " ╠══════════════════════════════════════════════════════════════════╣"
            .bright_cyan()
            .to_string(),
        banner_row(" Algorithms   cosmic_harmony · yescrypt · randomx · autolykos   ".white()),
        banner_row(" GPU Accel    OpenCL (autolykos)                                ".white()),
        " ╚══════════════════════════════════════════════════════════════════╝"
            .bright_cyan()
            .to_string(),
    ]
}

pub fn print_banner() {
    println!();
    for line in banner_lines() {
        println!("{}", line);
    }
    println!();
}
