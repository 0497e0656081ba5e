//! Scan summary report parsing.
//!
//! Recovers the per-radio and frequency totals tables from a `summary.txt`
//! without access to the scan that produced it. Unrelated sections are
//! ignored and individual malformed rows are dropped.

use crate::error::{ScanError, ScanResult};
use crate::models::{Frequency, ParsedRadio};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, trace};

const PER_RADIO_PREFIX: &str = "=== Per-Radio Summary";
const FREQ_TOTALS_PREFIX: &str = "=== Strongest Center Frequencies";
const SECTION_PREFIX: &str = "===";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    PerRadio,
    FreqTotals,
}

/// Tables recovered from a report.
#[derive(Debug, Clone, Default)]
pub struct ParsedReport {
    /// Radios in report order; ids are unique.
    pub radios: Vec<ParsedRadio>,
    /// Message totals per center frequency.
    pub frequency_totals: BTreeMap<Frequency, u64>,
}

/// Whether a report carries both tables the analysis needs.
pub fn is_analyzable(text: &str) -> bool {
    text.contains(PER_RADIO_PREFIX) && text.contains(FREQ_TOTALS_PREFIX)
}

/// Parse a report file.
pub fn parse_report(path: &Path) -> ScanResult<ParsedReport> {
    let bytes = std::fs::read(path).map_err(|e| ScanError::io(path, e))?;
    let text = String::from_utf8_lossy(&bytes);
    parse_report_text(&text, path)
}

/// Parse report text. `source` only labels errors.
pub fn parse_report_text(text: &str, source: &Path) -> ScanResult<ParsedReport> {
    let mut section = Section::None;
    let mut saw_section = false;
    let mut report = ParsedReport::default();
    let mut radio_index: HashMap<String, usize> = HashMap::new();

    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();

        if line.starts_with(PER_RADIO_PREFIX) {
            section = Section::PerRadio;
            saw_section = true;
            continue;
        }
        if line.starts_with(FREQ_TOTALS_PREFIX) {
            section = Section::FreqTotals;
            saw_section = true;
            continue;
        }
        if line.starts_with(SECTION_PREFIX) {
            section = Section::None;
            continue;
        }

        if section == Section::None || is_filler(line) {
            continue;
        }

        match section {
            Section::PerRadio => match parse_radio_row(line) {
                Some(radio) => match radio_index.get(&radio.id) {
                    Some(&idx) => report.radios[idx] = radio,
                    None => {
                        radio_index.insert(radio.id.clone(), report.radios.len());
                        report.radios.push(radio);
                    }
                },
                None => trace!("Skipping per-radio line {}: {}", line_no + 1, line),
            },
            Section::FreqTotals => match parse_total_row(line) {
                Some((freq, total)) => {
                    report.frequency_totals.insert(freq, total);
                }
                None => trace!("Skipping frequency line {}: {}", line_no + 1, line),
            },
            Section::None => {}
        }
    }

    if !saw_section {
        return Err(no_data(source, "no per-radio or frequency totals section"));
    }
    if report.radios.is_empty() {
        return Err(no_data(source, "no per-radio rows"));
    }
    if report.frequency_totals.is_empty() {
        return Err(no_data(source, "no center-frequency totals"));
    }

    debug!(
        "Parsed {} radios and {} frequencies from {}",
        report.radios.len(),
        report.frequency_totals.len(),
        source.display()
    );
    Ok(report)
}

fn no_data(source: &Path, reason: &str) -> ScanError {
    ScanError::NoData {
        path: source.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Blank lines, column headers and `-----` separators.
fn is_filler(line: &str) -> bool {
    line.is_empty()
        || line.starts_with("Total")
        || line.chars().all(|c| c == '-' || c.is_whitespace())
}

/// `total freqs id type f1, f2, ...`
fn parse_radio_row(line: &str) -> Option<ParsedRadio> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 5 {
        return None;
    }

    let total_messages: u64 = parts[0].parse().ok()?;
    let freqs_count: u64 = parts[1].parse().ok()?;

    let center_freqs = parts[4..]
        .join(" ")
        .split(',')
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .filter_map(|chunk| chunk.parse::<Frequency>().ok())
        .collect();

    Some(ParsedRadio {
        id: parts[2].to_string(),
        radio_type: parts[3].to_string(),
        total_messages,
        freqs_count,
        center_freqs,
        assigned_core: None,
    })
}

/// `total frequency`
fn parse_total_row(line: &str) -> Option<(Frequency, u64)> {
    let mut parts = line.split_whitespace();
    let (Some(total), Some(freq), None) = (parts.next(), parts.next(), parts.next()) else {
        return None;
    };
    Some((freq.parse().ok()?, total.parse().ok()?))
}
