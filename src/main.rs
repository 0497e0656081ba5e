//! amrscan - multi-frequency rtlamr scanner and scan analyzer
//!
//! Drives an rtlamr-style decoder across a list of center frequencies,
//! aggregates what it hears into a per-cycle report, and analyzes those
//! reports to recommend a small set of core frequencies.
//!
//! Exit codes:
//!   0   - Success (also dry runs and a declined confirmation)
//!   1   - Configuration, runtime or no-data error
//!   130 - Interrupted by the operator

mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod planner;
mod report;
mod scanner;

use anyhow::{bail, Context, Result};
use chrono::Local;
use cli::{AnalyzeArgs, Args, Command, ScanArgs};
use config::{expand_home, Config, CONFIG_FILE_NAME};
use error::ScanError;
use models::CycleKind;
use planner::{CyclePlan, FrequencySources, MessageTypeFilter};
use report::{find_latest_summary, parse_report, Recommendation};
use scanner::decoder::decoder_display_name;
use scanner::{DecoderSettings, DwellRunner};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let outcome = match args.command {
        // No logging needed
        Command::InitConfig => handle_init_config(),
        Command::Scan(ref scan) => {
            init_logging(&args);
            info!("amrscan v{}", env!("CARGO_PKG_VERSION"));
            debug!("Arguments: {:?}", args);
            run_scan(&args, scan).await
        }
        Command::Analyze(ref analyze) => {
            init_logging(&args);
            debug!("Arguments: {:?}", args);
            run_analyze(&args, analyze)
        }
    };

    match outcome {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            let exit_code = exit_code_for(&e);
            if exit_code == ScanError::Cancelled.exit_code() {
                eprintln!("\n[!] Interrupted; exiting.");
            } else {
                error!("{:#}", e);
                eprintln!("\nError: {:#}", e);
            }
            std::process::exit(exit_code);
        }
    }
}

/// Exit code for an error that reached `main`.
fn exit_code_for(e: &anyhow::Error) -> i32 {
    e.chain()
        .find_map(|cause| cause.downcast_ref::<ScanError>())
        .map(ScanError::exit_code)
        .unwrap_or(1)
}

/// Handle init-config: generate a default .amrscan.toml.
fn handle_init_config() -> Result<i32> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "[!] {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        return Ok(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("[*] Created {} with default settings.", CONFIG_FILE_NAME);
    println!("    Edit it to set the decoder path, server, dwell times and sweep window.");
    Ok(0)
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}

/// Run scan cycles until `--once`, cancellation, or an error.
async fn run_scan(args: &Args, scan: &ScanArgs) -> Result<i32> {
    let mut config = load_config(args)?;
    config.merge_scan_args(scan);
    config.validate_scan()?;

    let log_dir = expand_home(&config.scan.log_dir);
    let filter = MessageTypeFilter::from_arg(&config.decoder.msgtype);
    let settings = DecoderSettings::new(&config.decoder, &filter.selector);

    println!("[*] Starting rtlamr multi-frequency scanner.");
    println!("[*] Ensure rtl_tcp is running on the server, e.g.:");
    println!("    rtl_tcp -a 0.0.0.0 -g 7.7 -s {}", config.decoder.sample_rate);
    println!("[*] Using remote rtl_tcp server: {}", settings.server);
    println!("[*] Decoder samplerate: {}", settings.sample_rate);
    println!("[*] Using decoder binary: {}", settings.program);
    println!("[*] Logging directory: {}", log_dir.display());
    println!("[*] Decoder msgtype: {}", settings.msgtype);

    let plan = build_plan(&config)?;
    print_estimate(&plan);

    if scan.dry_run {
        println!("[*] Dry run requested; no scan will be started.");
        return Ok(0);
    }

    if scan.sanity_check && !confirm_start()? {
        return Ok(0);
    }

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let runner = DwellRunner::new(settings, filter, cancel.clone())
        .with_grace_period(Duration::from_secs(config.decoder.stop_grace_seconds));

    let mut cycle = 0u64;
    loop {
        cycle += 1;
        info!("Starting {} cycle {}", plan.kind, cycle);

        let outcome = scanner::run_cycle(&runner, &plan, &log_dir)
            .await
            .with_context(|| format!("{} cycle {} failed", plan.kind, cycle))?;
        debug!("Cycle {} finished: {:?}", cycle, outcome);

        if config.scan.once {
            break;
        }
        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled.into());
        }
    }

    Ok(0)
}

/// The cycle to repeat: an ISM sweep or the resolved core list.
fn build_plan(config: &Config) -> Result<CyclePlan> {
    if config.sweep.enabled {
        let sweep = &config.sweep;
        println!(
            "[*] ISM sweep enabled: {:.3}-{:.3} MHz @ {:.1} kHz steps",
            sweep.min_mhz, sweep.max_mhz, sweep.step_khz
        );
        let frequencies = planner::build_sweep(sweep.min_mhz, sweep.max_mhz, sweep.step_khz)?;
        return Ok(CyclePlan {
            kind: CycleKind::Ism,
            frequencies,
            dwell_seconds: planner::clamp_ism_dwell(sweep.seconds_per_freq),
        });
    }

    println!("[*] ISM sweep disabled; using core bandplan only.");
    let sources = FrequencySources {
        recommendation: config.scan.core_json.clone(),
        manual: config.scan.freqs.clone(),
    };
    let (source, frequencies) = sources.resolve()?;

    println!("[*] Using core freqs from {}:", source);
    for freq in &frequencies {
        println!("    - {} MHz", freq);
    }

    Ok(CyclePlan {
        kind: CycleKind::Core,
        frequencies,
        dwell_seconds: config.scan.seconds_per_freq,
    })
}

fn print_estimate(plan: &CyclePlan) {
    let count = plan.frequencies.len();
    println!(
        "[*] Estimated {} cycle: {} ({} freqs x {}s)",
        plan.kind,
        planner::format_hms(plan.total_seconds()),
        count,
        plan.dwell_seconds
    );
    println!(
        "[*] If started now, finish around: {}",
        planner::format_eta(plan.eta(Local::now(), count))
    );
}

/// Ask before starting. Anything but an answer starting with `n` proceeds.
fn confirm_start() -> Result<bool> {
    print!("[?] Proceed with scan? [Y/n]: ");
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut answer = String::new();
    let read = io::stdin()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    if read == 0 {
        println!("\n[!] Scan aborted before start.");
        return Ok(false);
    }

    if answer.trim_start().starts_with(['n', 'N']) {
        println!("[*] Scan cancelled by user before start.");
        return Ok(false);
    }

    Ok(true)
}

/// Cancel the scan on Ctrl-C.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received; stopping current decoder");
                cancel.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}

/// Analyze a report and write the recommendation files next to it.
fn run_analyze(args: &Args, analyze: &AnalyzeArgs) -> Result<i32> {
    let mut config = load_config(args)?;
    config.merge_analyze_args(analyze);

    let summary_path = match analyze.summary {
        Some(ref path) => expand_home(path),
        None => find_latest_summary(&expand_home(&config.analysis.log_dir))?,
    };
    if !summary_path.is_file() {
        bail!("summary.txt not found at {}", summary_path.display());
    }
    let summary_path = summary_path.canonicalize().unwrap_or(summary_path);

    println!("[*] Using summary file: {}", summary_path.display());
    println!("[*] Parsing summary...");
    let mut report = parse_report(&summary_path)?;
    println!(
        "[*] Parsed {} radios and {} center frequencies.",
        report.radios.len(),
        report.frequency_totals.len()
    );

    let core_count = config.analysis.core_count.max(1);
    let core = analysis::choose_core(&report.frequency_totals, core_count);

    println!("[*] Selected core center frequencies:");
    for (pos, freq) in core.iter().enumerate() {
        println!(
            "    {}. {} MHz (total messages: {})",
            pos + 1,
            freq,
            report.frequency_totals.get(freq).copied().unwrap_or(0)
        );
    }

    let assignment = analysis::assign(&mut report.radios, &core, &report.frequency_totals);

    let out_dir = summary_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let decoder = decoder_display_name(&config.decoder.path);
    let recommendation = Recommendation {
        summary_path: &summary_path,
        radios: &report.radios,
        assignment: &assignment,
        frequency_totals: &report.frequency_totals,
        decoder: &decoder,
        top_n_per_core: config.analysis.top_n_per_core,
    };

    let files = recommendation
        .write(&out_dir)
        .with_context(|| format!("Failed to write recommendations to {}", out_dir.display()))?;
    println!("[*] Wrote {}", files.core_freqs.display());
    println!("[*] Wrote {}", files.radios.display());
    println!("[*] Wrote {}", files.commands.display());
    println!("[*] Done.");

    Ok(0)
}
