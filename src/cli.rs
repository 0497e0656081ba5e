//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Tunables are optional here so that values
//! from `.amrscan.toml` survive unless a flag overrides them.

use crate::config::{is_host_port, MAX_DWELL_SECONDS};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// amrscan - multi-frequency rtlamr scanner and report analyzer
///
/// Drives rtlamr across a list of center frequencies, logs every decoded
/// message, summarizes which meters were heard where, and recommends a
/// small set of core frequencies from a finished sweep.
///
/// Examples:
///   amrscan scan --decoder ~/go/bin/rtlamr --once
///   amrscan scan --decoder rtlamr --ism-sweep --ism-seconds-per-freq 20
///   amrscan scan --decoder rtlamr --core-json ~/rtlamr_logs/scan_x/core_freqs.json
///   amrscan analyze --core-count 3
///   amrscan init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .amrscan.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Scan core frequencies or sweep the ISM band
    Scan(ScanArgs),
    /// Analyze a scan summary and recommend core frequencies
    Analyze(AnalyzeArgs),
    /// Generate a default .amrscan.toml configuration file
    InitConfig,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ScanArgs {
    /// Path to the rtlamr binary
    #[arg(long, value_name = "PATH", env = "AMRSCAN_DECODER")]
    pub decoder: Option<String>,

    /// rtl_tcp server (host:port) [default: 127.0.0.1:1234]
    #[arg(long, value_name = "ADDR", env = "AMRSCAN_SERVER")]
    pub server: Option<String>,

    /// Decoder sample rate [default: 2359296]
    #[arg(long, value_name = "RATE")]
    pub sample_rate: Option<u32>,

    /// Dwell time per core frequency in seconds [default: 120]
    #[arg(long, value_name = "SECS")]
    pub seconds_per_freq: Option<u64>,

    /// Comma-separated core center frequencies in MHz
    ///
    /// Overrides the built-in core bandplan.
    #[arg(long, value_name = "MHZ_LIST")]
    pub freqs: Option<String>,

    /// core_freqs.json produced by `amrscan analyze`
    ///
    /// Overrides both the built-in bandplan and --freqs.
    #[arg(long, value_name = "FILE")]
    pub core_json: Option<PathBuf>,

    /// Sweep the ISM band instead of scanning core frequencies
    #[arg(long)]
    pub ism_sweep: bool,

    /// Dwell time per sweep frequency in seconds, clamped to 5-120 [default: 30]
    #[arg(long, value_name = "SECS")]
    pub ism_seconds_per_freq: Option<u64>,

    /// Lower edge of the sweep in MHz [default: 902.0]
    #[arg(long, value_name = "MHZ")]
    pub ism_min_mhz: Option<f64>,

    /// Upper edge of the sweep in MHz [default: 928.0]
    #[arg(long, value_name = "MHZ")]
    pub ism_max_mhz: Option<f64>,

    /// Sweep step in kHz [default: 300.0]
    #[arg(long, value_name = "KHZ")]
    pub ism_step_khz: Option<f64>,

    /// Message types: all, or a comma list such as scm,idm,r900 [default: all]
    #[arg(long, value_name = "TYPES")]
    pub msgtype: Option<String>,

    /// Directory for run logs [default: ~/rtlamr_logs]
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Show configuration and ETA, then exit without scanning
    #[arg(long)]
    pub dry_run: bool,

    /// Ask for confirmation before starting
    #[arg(long)]
    pub sanity_check: bool,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct AnalyzeArgs {
    /// Path to summary.txt
    ///
    /// If omitted, the newest analyzable summary under --log-dir is used.
    #[arg(long, value_name = "FILE")]
    pub summary: Option<PathBuf>,

    /// Log directory to search when --summary is not given
    /// [default: ~/rtlamr/logs/ism_sweeps]
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// How many core frequencies to select [default: 2]
    #[arg(long, value_name = "COUNT")]
    pub core_count: Option<usize>,

    /// Radios listed per core in the suggested commands file [default: 10]
    #[arg(long, value_name = "COUNT")]
    pub top_n_per_core: Option<usize>,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        match self.command {
            Command::Scan(ref scan) => scan.validate(),
            Command::Analyze(ref analyze) => analyze.validate(),
            Command::InitConfig => Ok(()),
        }
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

impl ScanArgs {
    fn validate(&self) -> Result<(), String> {
        if let Some(seconds) = self.seconds_per_freq {
            if seconds == 0 || seconds > MAX_DWELL_SECONDS {
                return Err(format!(
                    "Seconds per frequency must be between 1 and {}",
                    MAX_DWELL_SECONDS
                ));
            }
        }

        if self.sample_rate == Some(0) {
            return Err("Sample rate must be positive".to_string());
        }

        if let Some(ref server) = self.server {
            if !is_host_port(server) {
                return Err(format!("Server must be host:port (got '{}')", server));
            }
        }

        if let Some(ref path) = self.core_json {
            if !path.as_os_str().is_empty() && path.is_dir() {
                return Err(format!("--core-json is a directory: {}", path.display()));
            }
        }

        Ok(())
    }
}

impl AnalyzeArgs {
    fn validate(&self) -> Result<(), String> {
        if self.top_n_per_core == Some(0) {
            return Err("Top radios per core must be at least 1".to_string());
        }
        Ok(())
    }
}
