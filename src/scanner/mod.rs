//! Scan cycles.
//!
//! A cycle visits every frequency of a [`CyclePlan`] in order, one decoder
//! dwell at a time, and leaves a run directory behind:
//!
//! ```text
//! <log_dir>/scan_YYYYMMDD_HHMMSS/
//!     raw.jsonl      every non-blank decoder stdout line
//!     summary.txt    fixed-width report
//!     summary.json   the same tables as JSON
//! ```

pub mod decoder;
pub mod dwell;

pub use decoder::DecoderSettings;
pub use dwell::{DwellOutcome, DwellRunner, RawLog};

use crate::analysis::Aggregator;
use crate::error::{ScanError, ScanResult};
use crate::models::CycleKind;
use crate::planner::{format_eta, format_hms, CyclePlan};
use crate::report::generator::{generate_text_report, write_json_snapshot, write_report};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

pub const RAW_LOG_FILE: &str = "raw.jsonl";
pub const SUMMARY_TEXT_FILE: &str = "summary.txt";
pub const SUMMARY_JSON_FILE: &str = "summary.json";

/// Artifacts and totals of a finished cycle.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub run_dir: PathBuf,
    pub raw_log: PathBuf,
    pub summary: PathBuf,
    pub summary_json: PathBuf,
    pub messages: u64,
    pub radios: usize,
}

/// Run directory name for a cycle starting at `started`.
pub fn run_dir_name(started: DateTime<Local>) -> String {
    format!("scan_{}", started.format("%Y%m%d_%H%M%S"))
}

/// Run one cycle and write its report.
///
/// The report is written even when the cycle stops early; the stopping
/// error ([`ScanError::Cancelled`] or a decoder failure) is returned after.
pub async fn run_cycle(
    runner: &DwellRunner,
    plan: &CyclePlan,
    log_dir: &Path,
) -> ScanResult<CycleOutcome> {
    let started_at = Local::now();
    let started = Instant::now();

    let run_dir = log_dir.join(run_dir_name(started_at));
    tokio::fs::create_dir_all(&run_dir)
        .await
        .map_err(|e| ScanError::io(&run_dir, e))?;

    let raw_path = run_dir.join(RAW_LOG_FILE);
    let summary_path = run_dir.join(SUMMARY_TEXT_FILE);
    let json_path = run_dir.join(SUMMARY_JSON_FILE);

    println!("[*] Logging enabled; run directory: {}", run_dir.display());
    println!("[*] Decoder msgtype argument: {}", runner.settings().msgtype);
    println!("[*] Internal message filter: {}", runner.filter().describe());
    print_plan_banner(plan);

    // Only core dwells are long enough for a live status line to matter
    let runner = runner
        .clone()
        .with_status_line(plan.kind == CycleKind::Core);

    let mut raw_log = RawLog::open_append(&raw_path).await?;
    let mut aggregator = Aggregator::new();
    let mut stopped: Option<ScanError> = None;

    let count = plan.frequencies.len();
    for (idx, freq) in plan.frequencies.iter().enumerate() {
        if runner.cancel_token().is_cancelled() {
            stopped = Some(ScanError::Cancelled);
            break;
        }

        println!(
            "\n=== [{}] Frequency {}/{}: {} MHz ===",
            plan.kind,
            idx + 1,
            count,
            freq.key()
        );
        let now = Local::now();
        let remaining = count - idx;
        println!(
            "[Time] Elapsed: {}  |  Remaining: {}  |  ETA: {}",
            format_hms(started.elapsed().as_secs()),
            format_hms(plan.seconds_for(remaining)),
            format_eta(plan.eta(now, remaining))
        );

        match runner
            .run(*freq, plan.dwell_seconds, &mut raw_log, &mut aggregator)
            .await
        {
            Ok(outcome) => debug!("Dwell on {} MHz: {:?}", freq, outcome),
            Err(e) => {
                stopped = Some(e);
                break;
            }
        }
    }

    raw_log.flush().await?;
    let decoder = runner.settings().display_name();
    write_report(&aggregator, &decoder, &summary_path)?;
    write_json_snapshot(&aggregator, &json_path)?;
    info!(
        "Wrote {} ({} messages, {} radios)",
        summary_path.display(),
        aggregator.total_messages(),
        aggregator.radio_count()
    );

    if aggregator.is_empty() {
        println!("\n[!] No messages decoded during this cycle.");
    }

    if let Some(e) = stopped {
        println!("\n[!] Cycle stopped early; partial summary: {}", summary_path.display());
        return Err(e);
    }

    if plan.kind == CycleKind::Core {
        println!("\n=== Summary for this cycle (screen copy) ===\n");
        print!("{}", generate_text_report(&aggregator, &decoder));
    }

    println!("\n[*] Cycle complete.");
    println!("    Raw JSON log:     {}", raw_path.display());
    println!("    Summary text log: {}", summary_path.display());

    Ok(CycleOutcome {
        run_dir,
        raw_log: raw_path,
        summary: summary_path,
        summary_json: json_path,
        messages: aggregator.total_messages(),
        radios: aggregator.radio_count(),
    })
}

fn print_plan_banner(plan: &CyclePlan) {
    let (Some(first), Some(last)) = (plan.frequencies.first(), plan.frequencies.last()) else {
        return;
    };
    match plan.kind {
        CycleKind::Ism => println!(
            "[*] ISM sweep: {} freqs from {} to {} MHz",
            plan.frequencies.len(),
            first,
            last
        ),
        CycleKind::Core => println!(
            "[*] Core frequencies: {}",
            plan.frequencies
                .iter()
                .map(|f| format!("{} MHz", f.key()))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
    println!("[*] {} seconds per frequency: {}", plan.kind, plan.dwell_seconds);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_dir_name() {
        let t = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(run_dir_name(t), "scan_20240309_070501");
    }

    #[cfg(unix)]
    mod cycle {
        use super::super::*;
        use crate::models::Frequency;
        use crate::planner::MessageTypeFilter;
        use crate::report::parser::parse_report;
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;
        use tempfile::TempDir;
        use tokio_util::sync::CancellationToken;

        // Reports one radio per dwell, keyed by the -centerfreq argument.
        const SCRIPT: &str = r#"#!/bin/sh
for arg in "$@"; do
  case "$arg" in
    -centerfreq=*) hz="${arg#-centerfreq=}" ;;
  esac
done
echo "{\"Type\":\"SCM\",\"Message\":{\"ID\":1}}"
echo "{\"Type\":\"R900\",\"Message\":{\"ID\":$hz}}"
"#;

        fn runner(dir: &Path, program: Option<&str>, cancel: CancellationToken) -> DwellRunner {
            let program = match program {
                Some(p) => p.to_string(),
                None => {
                    let path = dir.join("fake-rtlamr");
                    std::fs::write(&path, SCRIPT).unwrap();
                    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                        .unwrap();
                    path.to_string_lossy().into_owned()
                }
            };
            let settings = DecoderSettings {
                program,
                server: "127.0.0.1:1234".to_string(),
                sample_rate: 2_359_296,
                msgtype: "all".to_string(),
            };
            DwellRunner::new(settings, MessageTypeFilter::default(), cancel)
                .with_grace_period(Duration::from_secs(2))
        }

        fn plan(kind: CycleKind) -> CyclePlan {
            CyclePlan {
                kind,
                frequencies: vec![
                    Frequency::from_mhz(910.2).unwrap(),
                    Frequency::from_mhz(911.5).unwrap(),
                ],
                dwell_seconds: 1,
            }
        }

        #[tokio::test]
        async fn test_cycle_writes_run_directory() {
            let dir = TempDir::new().unwrap();
            let logs = dir.path().join("logs");
            let runner = runner(dir.path(), None, CancellationToken::new());

            let outcome = run_cycle(&runner, &plan(CycleKind::Ism), &logs).await.unwrap();

            assert!(outcome.run_dir.starts_with(&logs));
            assert!(outcome
                .run_dir
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("scan_"));
            assert_eq!(outcome.messages, 4);
            assert_eq!(outcome.radios, 3);
            assert_eq!(
                std::fs::read_to_string(&outcome.raw_log).unwrap().lines().count(),
                4
            );
            assert!(outcome.summary_json.is_file());

            let report = parse_report(&outcome.summary).unwrap();
            assert_eq!(report.radios[0].id, "1");
            assert_eq!(report.radios[0].total_messages, 2);
            assert_eq!(report.radios[0].freqs_count, 2);
            assert_eq!(report.frequency_totals.len(), 2);
            assert!(report.frequency_totals.values().all(|n| *n == 2));
        }

        #[tokio::test]
        async fn test_cancelled_cycle_still_writes_summary() {
            let dir = TempDir::new().unwrap();
            let logs = dir.path().join("logs");
            let cancel = CancellationToken::new();
            cancel.cancel();
            let runner = runner(dir.path(), None, cancel);

            let err = run_cycle(&runner, &plan(CycleKind::Core), &logs)
                .await
                .unwrap_err();
            assert!(matches!(err, ScanError::Cancelled));

            let run_dir = std::fs::read_dir(&logs).unwrap().next().unwrap().unwrap().path();
            let summary = std::fs::read_to_string(run_dir.join(SUMMARY_TEXT_FILE)).unwrap();
            assert!(summary.contains("=== Per-Radio Summary ==="));
            assert!(!summary.contains("Suggested"));
        }

        #[tokio::test]
        async fn test_mid_dwell_cancel_reports_partial_aggregation() {
            let dir = TempDir::new().unwrap();
            let logs = dir.path().join("logs");
            let script = dir.path().join("slow-rtlamr");
            std::fs::write(
                &script,
                "#!/bin/sh\necho '{\"Type\":\"SCM\",\"Message\":{\"ID\":4242}}'\nexec sleep 30\n",
            )
            .unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

            let cancel = CancellationToken::new();
            let runner = runner(dir.path(), script.to_str(), cancel.clone());
            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                trigger.cancel();
            });

            let mut plan = plan(CycleKind::Core);
            plan.dwell_seconds = 30;
            let err = run_cycle(&runner, &plan, &logs).await.unwrap_err();
            assert!(matches!(err, ScanError::Cancelled));

            let run_dir = std::fs::read_dir(&logs).unwrap().next().unwrap().unwrap().path();
            let report = parse_report(&run_dir.join(SUMMARY_TEXT_FILE)).unwrap();
            assert_eq!(report.radios.len(), 1);
            assert_eq!(report.radios[0].id, "4242");
            assert_eq!(report.radios[0].total_messages, 1);
            assert_eq!(report.radios[0].center_freqs, vec![plan.frequencies[0]]);
            assert_eq!(report.frequency_totals.get(&plan.frequencies[0]), Some(&1));
            assert_eq!(report.frequency_totals.len(), 1);
        }

        #[tokio::test]
        async fn test_decoder_failure_writes_summary_then_errors() {
            let dir = TempDir::new().unwrap();
            let logs = dir.path().join("logs");
            let runner = runner(
                dir.path(),
                Some("/nonexistent/rtlamr"),
                CancellationToken::new(),
            );

            let err = run_cycle(&runner, &plan(CycleKind::Core), &logs)
                .await
                .unwrap_err();
            assert!(matches!(err, ScanError::Process(_)));

            let run_dir = std::fs::read_dir(&logs).unwrap().next().unwrap().unwrap().path();
            assert!(run_dir.join(SUMMARY_TEXT_FILE).is_file());
            assert!(run_dir.join(SUMMARY_JSON_FILE).is_file());
        }
    }
}
