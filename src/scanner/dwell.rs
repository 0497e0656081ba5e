//! One decoder run on one center frequency.
//!
//! The runner owns the child process for the length of a dwell. The stdout
//! loop is the only writer of the aggregator; stderr is drained by a
//! separate task that only logs.

use crate::analysis::Aggregator;
use crate::error::{ScanError, ScanResult};
use crate::models::Frequency;
use crate::planner::MessageTypeFilter;
use crate::scanner::decoder::{decode_line, is_diagnostic_error, DecoderSettings};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStderr};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// How long a stopping decoder gets before it is killed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Append-only log of every non-blank decoder stdout line.
#[derive(Debug)]
pub struct RawLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl RawLog {
    /// Open `path` for appending, creating it if needed.
    pub async fn open_append(path: &Path) -> ScanResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| ScanError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    /// Write one line followed by `\n`.
    pub async fn write_line(&mut self, line: &str) -> ScanResult<()> {
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ScanError::io(&self.path, e))?;
        self.writer
            .write_all(b"\n")
            .await
            .map_err(|e| ScanError::io(&self.path, e))
    }

    pub async fn flush(&mut self) -> ScanResult<()> {
        self.writer
            .flush()
            .await
            .map_err(|e| ScanError::io(&self.path, e))
    }
}

/// Counters local to one dwell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DwellOutcome {
    /// Accepted records.
    pub messages: u64,
    /// Distinct radios among them.
    pub radios: usize,
    /// Distinct message types among them.
    pub types: BTreeSet<String>,
}

impl DwellOutcome {
    fn type_list(&self) -> String {
        self.types.iter().cloned().collect::<Vec<_>>().join(", ")
    }

    /// Live status text, e.g. `12 msgs, 3 radios, types: IDM, SCM`.
    pub fn status(&self) -> String {
        format!(
            "{} msgs, {} radios, types: {}",
            self.messages,
            self.radios,
            self.type_list()
        )
    }

    /// Line printed when the dwell ends.
    pub fn summary_line(&self) -> String {
        if self.messages == 0 {
            "    -> no messages decoded on this frequency.".to_string()
        } else {
            format!(
                "    -> {} messages from {} radios (types: {})",
                self.messages,
                self.radios,
                self.type_list()
            )
        }
    }
}

/// Runs the decoder for single dwells.
#[derive(Debug, Clone)]
pub struct DwellRunner {
    settings: DecoderSettings,
    filter: MessageTypeFilter,
    cancel: CancellationToken,
    show_status: bool,
    grace: Duration,
}

impl DwellRunner {
    pub fn new(settings: DecoderSettings, filter: MessageTypeFilter, cancel: CancellationToken) -> Self {
        Self {
            settings,
            filter,
            cancel,
            show_status: false,
            grace: DEFAULT_GRACE_PERIOD,
        }
    }

    /// Draw a live status line while records arrive.
    pub fn with_status_line(mut self, show: bool) -> Self {
        self.show_status = show;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn settings(&self) -> &DecoderSettings {
        &self.settings
    }

    pub fn filter(&self) -> &MessageTypeFilter {
        &self.filter
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run the decoder on `center` for `seconds`, folding accepted records
    /// into `aggregator` and mirroring raw output to `raw_log`.
    ///
    /// Returns [`ScanError::Cancelled`] if the token fires; records seen
    /// up to that point stay in the aggregator.
    pub async fn run(
        &self,
        center: Frequency,
        seconds: u64,
        raw_log: &mut RawLog,
        aggregator: &mut Aggregator,
    ) -> ScanResult<DwellOutcome> {
        println!("[*] Scanning {} MHz for {} seconds...", center.key(), seconds);
        debug!("Running: {}", self.settings.command_line(center, seconds));

        let mut child = self.settings.command(center, seconds).spawn().map_err(|e| {
            ScanError::Process(format!("failed to start '{}': {}", self.settings.program, e))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ScanError::Process("decoder stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ScanError::Process("decoder stderr was not captured".to_string()))?;

        let pb = self.status_bar();
        let stderr_task = tokio::spawn(drain_stderr(stderr, pb.clone()));

        let mut lines = BufReader::new(stdout).lines();
        let mut outcome = DwellOutcome::default();
        let mut seen: HashSet<u64> = HashSet::new();
        let mut cancelled = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                line = lines.next_line() => line,
            };

            let line = match next {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read decoder output: {}", e);
                    break;
                }
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            raw_log.write_line(line).await?;

            let record = match decode_line(line, center).map_err(ScanError::from) {
                Ok(record) => record,
                Err(e) => {
                    trace!("{}; dropping line: {}", e, line);
                    continue;
                }
            };

            if !self.filter.accepts(&record.message_type) {
                continue;
            }

            aggregator.record(&record);
            outcome.messages += 1;
            seen.insert(record.radio_id);
            outcome.radios = seen.len();
            outcome.types.insert(record.message_type);

            pb.set_message(outcome.status());
        }

        if cancelled {
            pb.finish_and_clear();
            println!("\n[!] Interrupt received; stopping decoder on {} MHz...", center);
            request_stop(&mut child);
            reap(&mut child, self.grace, true).await;
            stderr_task.abort();
            raw_log.flush().await?;
            return Err(ScanError::Cancelled);
        }

        reap(&mut child, self.grace, false).await;
        // A grandchild can hold stderr open past the decoder's exit
        if !join_or_abort(stderr_task, self.grace).await {
            debug!("Decoder stderr still open after exit; stopped reading it");
        }
        raw_log.flush().await?;

        pb.finish_and_clear();
        println!("{}", outcome.summary_line());

        Ok(outcome)
    }

    fn status_bar(&self) -> ProgressBar {
        if !self.show_status {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("    {spinner:.green} [{msg}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }
}

/// Log decoder stderr: diagnostics as warnings, everything else at debug.
async fn drain_stderr(stderr: ChildStderr, pb: ProgressBar) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_diagnostic_error(line) {
            pb.suspend(|| warn!("[decoder stderr] {}", line));
        } else {
            debug!("[decoder stderr] {}", line);
        }
    }
}

#[cfg(unix)]
fn request_stop(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    #[allow(clippy::cast_possible_wrap)]
    let target = Pid::from_raw(pid as i32);
    if let Err(e) = kill(target, Signal::SIGTERM) {
        debug!("SIGTERM to decoder {} failed: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!("Failed to stop decoder: {}", e);
    }
}

/// Wait for the decoder to exit, killing it once `grace` runs out.
/// Wait up to `grace` for `task`, aborting it if it is still running.
/// Returns whether it finished on its own.
async fn join_or_abort(mut task: JoinHandle<()>, grace: Duration) -> bool {
    if tokio::time::timeout(grace, &mut task).await.is_ok() {
        return true;
    }
    task.abort();
    false
}

async fn reap(child: &mut Child, grace: Duration, stopping: bool) {
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) if status.success() || stopping => {
            debug!("Decoder exited: {}", status);
        }
        Ok(Ok(status)) => warn!("Decoder exited with {}", status),
        Ok(Err(e)) => warn!("Failed to wait for decoder: {}", e),
        Err(_) => {
            warn!(
                "Decoder still running {}s after it should have stopped; killing it",
                grace.as_secs()
            );
            if let Err(e) = child.kill().await {
                warn!("Failed to kill decoder: {}", e);
            }
        }
    }
}
