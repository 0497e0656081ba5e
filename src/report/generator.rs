//! Scan summary report generation.
//!
//! Renders a cycle's aggregation into the fixed-width `summary.txt` tables.
//! The column layout is a compatibility contract: `report::parser` reads it
//! back, so any change here must keep the section markers, the two header
//! lines per section, and whitespace-separated columns intact.
//!
//! A machine-readable `summary.json` snapshot of the same tables is written
//! alongside.

use crate::analysis::Aggregator;
use crate::error::{ScanError, ScanResult};
use crate::models::{Frequency, RadioStat};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// Marker line opening the per-radio table.
pub const PER_RADIO_HEADER: &str = "=== Per-Radio Summary ===";
/// Marker line opening the frequency totals table.
pub const FREQ_TOTALS_HEADER: &str = "=== Strongest Center Frequencies (by total messages) ===";
/// Marker line opening the message type table.
pub const TYPE_TOTALS_HEADER: &str = "=== Message Types Totals ===";

/// Generate the complete text report.
///
/// `decoder` is the program name used in the suggested follow-up command.
pub fn generate_text_report(aggregator: &Aggregator, decoder: &str) -> String {
    let mut output = String::new();

    output.push_str(&generate_radio_section(aggregator));
    output.push('\n');
    output.push_str(&generate_frequency_section(aggregator));
    output.push('\n');
    output.push_str(&generate_type_section(aggregator));

    if let Some(strongest) = aggregator.strongest_radio() {
        output.push('\n');
        output.push_str(&generate_suggestion(strongest, decoder));
    }

    output
}

/// Per-radio table: strongest first, ties in first-observation order.
fn generate_radio_section(aggregator: &Aggregator) -> String {
    let mut section = String::new();

    section.push_str(PER_RADIO_HEADER);
    section.push('\n');
    section.push_str("Total   Freqs   ID         Type      CenterFreqs (MHz)\n");
    section.push_str("-----   -----   ---------- --------  ------------------\n");

    for radio in aggregator.radios_by_total() {
        section.push_str(&format_radio_row(radio));
    }

    section
}

fn format_radio_row(radio: &RadioStat) -> String {
    let freqs = join_frequencies(radio.per_frequency.keys().copied());
    format!(
        "{:5}   {:5}   {:10} {:<8}  {}\n",
        radio.total,
        radio.distinct_frequencies(),
        radio.id,
        radio.last_type,
        freqs
    )
}

/// Comma-separated three-decimal list, e.g. `910.200, 911.500`.
pub fn join_frequencies(freqs: impl IntoIterator<Item = Frequency>) -> String {
    freqs
        .into_iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Frequency totals table at six-decimal precision.
fn generate_frequency_section(aggregator: &Aggregator) -> String {
    let mut section = String::new();

    section.push_str(FREQ_TOTALS_HEADER);
    section.push('\n');
    section.push_str("Total   CenterFreq (MHz)\n");
    section.push_str("-----   ----------------\n");

    for (freq, total) in aggregator.frequencies_by_total() {
        section.push_str(&format!("{:5}   {}\n", total, freq.key()));
    }

    section
}

fn generate_type_section(aggregator: &Aggregator) -> String {
    let mut section = String::new();

    section.push_str(TYPE_TOTALS_HEADER);
    section.push('\n');
    section.push_str("Type     Total\n");
    section.push_str("-------- -----\n");

    for (message_type, total) in aggregator.types_by_total() {
        section.push_str(&format!("{:<8} {:5}\n", message_type, total));
    }

    section
}

fn generate_suggestion(strongest: &RadioStat, decoder: &str) -> String {
    format!(
        "[*] Suggested {} command to track strongest meter:\n\n    {} -filterid={} -format=json\n",
        decoder, decoder, strongest.id
    )
}

/// Write the text report to a file.
pub fn write_report(aggregator: &Aggregator, decoder: &str, path: &Path) -> ScanResult<()> {
    let content = generate_text_report(aggregator, decoder);
    std::fs::write(path, content).map_err(|e| ScanError::io(path, e))
}

#[derive(Debug, Serialize)]
struct FrequencyTotalRow {
    freq_mhz: Frequency,
    total_messages: u64,
}

#[derive(Debug, Serialize)]
struct TypeTotalRow<'a> {
    #[serde(rename = "type")]
    message_type: &'a str,
    total_messages: u64,
}

/// Machine-readable sibling of the text report.
#[derive(Debug, Serialize)]
pub struct ReportSnapshot<'a> {
    generated_at: DateTime<Utc>,
    total_messages: u64,
    radios: Vec<&'a RadioStat>,
    frequency_totals: Vec<FrequencyTotalRow>,
    type_totals: Vec<TypeTotalRow<'a>>,
}

impl<'a> ReportSnapshot<'a> {
    /// Capture the aggregator's tables in report order.
    pub fn new(aggregator: &'a Aggregator) -> Self {
        Self {
            generated_at: Utc::now(),
            total_messages: aggregator.total_messages(),
            radios: aggregator.radios_by_total(),
            frequency_totals: aggregator
                .frequencies_by_total()
                .into_iter()
                .map(|(freq_mhz, total_messages)| FrequencyTotalRow {
                    freq_mhz,
                    total_messages,
                })
                .collect(),
            type_totals: aggregator
                .types_by_total()
                .into_iter()
                .map(|(message_type, total_messages)| TypeTotalRow {
                    message_type,
                    total_messages,
                })
                .collect(),
        }
    }
}

/// Generate the JSON snapshot.
pub fn generate_json_snapshot(aggregator: &Aggregator) -> ScanResult<String> {
    serde_json::to_string_pretty(&ReportSnapshot::new(aggregator)).map_err(Into::into)
}

/// Write the JSON snapshot to a file.
pub fn write_json_snapshot(aggregator: &Aggregator, path: &Path) -> ScanResult<()> {
    let content = generate_json_snapshot(aggregator)?;
    std::fs::write(path, content).map_err(|e| ScanError::io(path, e))
}
