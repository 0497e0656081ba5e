//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.amrscan.toml` files.

use crate::cli::{AnalyzeArgs, ScanArgs};
use crate::error::{ScanError, ScanResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = ".amrscan.toml";

/// Longest dwell accepted for a single frequency (one day).
pub const MAX_DWELL_SECONDS: u64 = 86_400;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Decoder process settings.
    #[serde(default)]
    pub decoder: DecoderConfig,

    /// Core scan settings.
    #[serde(default)]
    pub scan: ScanConfig,

    /// ISM sweep settings.
    #[serde(default)]
    pub sweep: SweepConfig,

    /// Report analysis settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// How to run the external decoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Path to the decoder binary.
    #[serde(default = "default_decoder_path")]
    pub path: String,

    /// rtl_tcp server (host:port).
    #[serde(default = "default_server")]
    pub server: String,

    /// Decoder sample rate.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Message types: `all` or a comma list such as `scm,idm`.
    #[serde(default = "default_msgtype")]
    pub msgtype: String,

    /// Seconds a stopping decoder gets before it is killed.
    #[serde(default = "default_stop_grace")]
    pub stop_grace_seconds: u64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            path: default_decoder_path(),
            server: default_server(),
            sample_rate: default_sample_rate(),
            msgtype: default_msgtype(),
            stop_grace_seconds: default_stop_grace(),
        }
    }
}

fn default_decoder_path() -> String {
    "rtlamr".to_string()
}

fn default_server() -> String {
    "127.0.0.1:1234".to_string()
}

fn default_sample_rate() -> u32 {
    2_359_296
}

fn default_msgtype() -> String {
    "all".to_string()
}

fn default_stop_grace() -> u64 {
    5
}

/// Core scan settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Dwell per core frequency in seconds.
    #[serde(default = "default_core_seconds")]
    pub seconds_per_freq: u64,

    /// Comma-separated core frequencies in MHz.
    #[serde(default)]
    pub freqs: Option<String>,

    /// `core_freqs.json` from a previous analysis.
    #[serde(default)]
    pub core_json: Option<PathBuf>,

    /// Directory that receives one `scan_*` directory per cycle.
    #[serde(default = "default_scan_log_dir")]
    pub log_dir: PathBuf,

    /// Stop after a single cycle.
    #[serde(default)]
    pub once: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            seconds_per_freq: default_core_seconds(),
            freqs: None,
            core_json: None,
            log_dir: default_scan_log_dir(),
            once: false,
        }
    }
}

fn default_core_seconds() -> u64 {
    120
}

fn default_scan_log_dir() -> PathBuf {
    PathBuf::from("~/rtlamr_logs")
}

/// ISM sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Run a sweep instead of a core scan.
    #[serde(default)]
    pub enabled: bool,

    /// Dwell per sweep frequency in seconds (clamped to 5-120).
    #[serde(default = "default_ism_seconds")]
    pub seconds_per_freq: u64,

    /// Lower edge in MHz.
    #[serde(default = "default_ism_min")]
    pub min_mhz: f64,

    /// Upper edge in MHz.
    #[serde(default = "default_ism_max")]
    pub max_mhz: f64,

    /// Step in kHz.
    #[serde(default = "default_ism_step")]
    pub step_khz: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            seconds_per_freq: default_ism_seconds(),
            min_mhz: default_ism_min(),
            max_mhz: default_ism_max(),
            step_khz: default_ism_step(),
        }
    }
}

fn default_ism_seconds() -> u64 {
    30
}

fn default_ism_min() -> f64 {
    crate::planner::DEFAULT_ISM_MIN_MHZ
}

fn default_ism_max() -> f64 {
    crate::planner::DEFAULT_ISM_MAX_MHZ
}

fn default_ism_step() -> f64 {
    crate::planner::DEFAULT_ISM_STEP_KHZ
}

/// Report analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Where to look for the newest report when none is named.
    #[serde(default = "default_analysis_log_dir")]
    pub log_dir: PathBuf,

    /// How many core frequencies to recommend.
    #[serde(default = "default_core_count")]
    pub core_count: usize,

    /// Radios listed per core in the suggested commands file.
    #[serde(default = "default_top_n")]
    pub top_n_per_core: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            log_dir: default_analysis_log_dir(),
            core_count: default_core_count(),
            top_n_per_core: default_top_n(),
        }
    }
}

fn default_analysis_log_dir() -> PathBuf {
    PathBuf::from("~/rtlamr/logs/ism_sweeps")
}

fn default_core_count() -> usize {
    2
}

fn default_top_n() -> usize {
    10
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge scan CLI arguments into this configuration.
    ///
    /// CLI arguments take precedence; unset options keep the file values.
    pub fn merge_scan_args(&mut self, args: &ScanArgs) {
        if let Some(ref decoder) = args.decoder {
            self.decoder.path = decoder.clone();
        }
        if let Some(ref server) = args.server {
            self.decoder.server = server.clone();
        }
        if let Some(rate) = args.sample_rate {
            self.decoder.sample_rate = rate;
        }
        if let Some(ref msgtype) = args.msgtype {
            self.decoder.msgtype = msgtype.clone();
        }

        if let Some(seconds) = args.seconds_per_freq {
            self.scan.seconds_per_freq = seconds;
        }
        if let Some(ref freqs) = args.freqs {
            self.scan.freqs = Some(freqs.clone());
        }
        if let Some(ref core_json) = args.core_json {
            self.scan.core_json = Some(core_json.clone());
        }
        if let Some(ref log_dir) = args.log_dir {
            self.scan.log_dir = log_dir.clone();
        }

        if let Some(seconds) = args.ism_seconds_per_freq {
            self.sweep.seconds_per_freq = seconds;
        }
        if let Some(min) = args.ism_min_mhz {
            self.sweep.min_mhz = min;
        }
        if let Some(max) = args.ism_max_mhz {
            self.sweep.max_mhz = max;
        }
        if let Some(step) = args.ism_step_khz {
            self.sweep.step_khz = step;
        }

        // Flags only ever switch on
        if args.ism_sweep {
            self.sweep.enabled = true;
        }
        if args.once {
            self.scan.once = true;
        }
    }

    /// Merge analyze CLI arguments into this configuration.
    pub fn merge_analyze_args(&mut self, args: &AnalyzeArgs) {
        if let Some(ref log_dir) = args.log_dir {
            self.analysis.log_dir = log_dir.clone();
        }
        if let Some(count) = args.core_count {
            self.analysis.core_count = count;
        }
        if let Some(top_n) = args.top_n_per_core {
            self.analysis.top_n_per_core = top_n;
        }
    }

    /// Check the merged scan settings before any decoder is launched.
    ///
    /// File values never pass through CLI validation, so this runs after
    /// [`Config::merge_scan_args`].
    pub fn validate_scan(&self) -> ScanResult<()> {
        let decoder = &self.decoder;
        if decoder.path.trim().is_empty() {
            return Err(ScanError::Config("decoder path is empty".to_string()));
        }
        if decoder.sample_rate == 0 {
            return Err(ScanError::Config("sample_rate must be positive".to_string()));
        }
        if !is_host_port(&decoder.server) {
            return Err(ScanError::Config(format!(
                "server must be host:port (got '{}')",
                decoder.server
            )));
        }

        // A zero duration makes the decoder run until killed
        let seconds = self.scan.seconds_per_freq;
        if seconds == 0 || seconds > MAX_DWELL_SECONDS {
            return Err(ScanError::Config(format!(
                "seconds_per_freq must be between 1 and {} (got {})",
                MAX_DWELL_SECONDS, seconds
            )));
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

/// `host:port` with a non-empty host and a numeric port.
pub fn is_host_port(server: &str) -> bool {
    match server.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

/// Expand a leading `~` to `$HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}
