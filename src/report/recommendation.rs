//! Recommendation artifacts.
//!
//! Writes `core_freqs.json`, `radios.json` and
//! `suggested_rtlamr_commands.txt` next to the analyzed report.

use crate::analysis::assignment::compare_strength;
use crate::analysis::{core_entries, CoreAssignment};
use crate::error::{ScanError, ScanResult};
use crate::models::{CoreFrequencyEntry, Frequency, ParsedRadio};
use crate::report::generator::join_frequencies;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Producer tag stored in both JSON files.
pub const GENERATED_BY: &str = "amrscan-analyze";
/// Schema version of the JSON files.
pub const FORMAT_VERSION: u32 = 1;

pub const CORE_FREQS_FILE: &str = "core_freqs.json";
pub const RADIOS_FILE: &str = "radios.json";
pub const COMMANDS_FILE: &str = "suggested_rtlamr_commands.txt";

/// Everything the emitter needs from one analysis pass.
#[derive(Debug)]
pub struct Recommendation<'a> {
    /// The analyzed `summary.txt`.
    pub summary_path: &'a Path,
    /// Parsed radios with `assigned_core` filled in.
    pub radios: &'a [ParsedRadio],
    pub assignment: &'a CoreAssignment,
    pub frequency_totals: &'a BTreeMap<Frequency, u64>,
    /// Program name used in the suggested commands.
    pub decoder: &'a str,
    pub top_n_per_core: usize,
}

/// Paths of the written artifacts.
#[derive(Debug, Clone)]
pub struct RecommendationFiles {
    pub core_freqs: PathBuf,
    pub radios: PathBuf,
    pub commands: PathBuf,
}

#[derive(Serialize)]
struct CoreFreqsDocument<'a> {
    generated_by: &'static str,
    version: u32,
    summary_file: String,
    core_freqs: &'a [CoreFrequencyEntry],
}

#[derive(Serialize)]
struct RadiosDocument<'a> {
    generated_by: &'static str,
    version: u32,
    summary_file: String,
    radios: Vec<RadioRow<'a>>,
}

#[derive(Serialize)]
struct RadioRow<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    radio_type: &'a str,
    total_messages: u64,
    freqs_count: u64,
    center_freqs_mhz: &'a [Frequency],
    assigned_core_freq_mhz: Option<Frequency>,
    rank_within_core: Option<usize>,
}

impl<'a> Recommendation<'a> {
    /// Ranked core entries for this assignment.
    pub fn core_entries(&self) -> Vec<CoreFrequencyEntry> {
        core_entries(self.radios, self.assignment, self.frequency_totals)
    }

    fn summary_file(&self) -> String {
        self.summary_path.display().to_string()
    }

    /// Render `core_freqs.json`.
    pub fn render_core_freqs(&self) -> ScanResult<String> {
        let entries = self.core_entries();
        let document = CoreFreqsDocument {
            generated_by: GENERATED_BY,
            version: FORMAT_VERSION,
            summary_file: self.summary_file(),
            core_freqs: &entries,
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Render `radios.json`: descending total, then id.
    pub fn render_radios(&self) -> ScanResult<String> {
        let ranks = self.assignment.ranks_within_core();

        let mut order: Vec<usize> = (0..self.radios.len()).collect();
        order.sort_by(|&a, &b| compare_strength(&self.radios[a], &self.radios[b]));

        let radios = order
            .into_iter()
            .map(|idx| {
                let radio = &self.radios[idx];
                RadioRow {
                    id: &radio.id,
                    radio_type: &radio.radio_type,
                    total_messages: radio.total_messages,
                    freqs_count: radio.freqs_count,
                    center_freqs_mhz: &radio.center_freqs,
                    assigned_core_freq_mhz: radio.assigned_core,
                    rank_within_core: radio.assigned_core.and_then(|_| ranks.get(&idx).copied()),
                }
            })
            .collect();

        let document = RadiosDocument {
            generated_by: GENERATED_BY,
            version: FORMAT_VERSION,
            summary_file: self.summary_file(),
            radios,
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Render the suggested decoder commands, one block per core frequency.
    pub fn render_commands(&self) -> String {
        let mut lines: Vec<String> = vec![
            format!("# Suggested {} commands per core center frequency", self.decoder),
            String::new(),
        ];

        for (pos, core) in self.assignment.core().iter().enumerate() {
            let total = self.frequency_totals.get(core).copied().unwrap_or(0);
            lines.push(format!(
                "# Core {}: {} MHz (total messages across all radios: {})",
                pos + 1,
                core,
                total
            ));

            let assigned = self.assignment.radios_for(*core);
            if assigned.is_empty() {
                lines.push("#   (no radios assigned)".to_string());
                lines.push(String::new());
                continue;
            }

            lines.push("#   Top radios at/near this center frequency:".to_string());
            lines.push(String::new());
            for idx in assigned.iter().take(self.top_n_per_core) {
                let radio = &self.radios[*idx];
                lines.push(format!(
                    "{} -filterid={} -format=json    # total={}, type={}, freqs=[{}]",
                    self.decoder,
                    radio.id,
                    radio.total_messages,
                    radio.radio_type,
                    join_frequencies(radio.center_freqs.iter().copied())
                ));
            }
            lines.push(String::new());
        }

        let mut output = lines.join("\n");
        output.push('\n');
        output
    }

    /// Write all three artifacts into `out_dir`.
    pub fn write(&self, out_dir: &Path) -> ScanResult<RecommendationFiles> {
        let files = RecommendationFiles {
            core_freqs: out_dir.join(CORE_FREQS_FILE),
            radios: out_dir.join(RADIOS_FILE),
            commands: out_dir.join(COMMANDS_FILE),
        };

        write_file(&files.core_freqs, &self.render_core_freqs()?)?;
        write_file(&files.radios, &self.render_radios()?)?;
        write_file(&files.commands, &self.render_commands())?;

        Ok(files)
    }
}

fn write_file(path: &Path, content: &str) -> ScanResult<()> {
    debug!("Writing {}", path.display());
    std::fs::write(path, content).map_err(|e| ScanError::io(path, e))
}
