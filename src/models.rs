//! Data models for the scanner and the analysis pass.
//!
//! This module contains the core data structures used throughout
//! the application for representing frequencies, decoded records,
//! per-radio statistics, and parsed report rows.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Hertz per megahertz.
const HZ_PER_MHZ: f64 = 1_000_000.0;

/// Highest frequency accepted from user input or reports (100 GHz).
pub const MAX_FREQUENCY_MHZ: f64 = 100_000.0;

/// Two frequencies closer than this are the same center frequency (1e-6 MHz).
pub const MATCH_TOLERANCE_HZ: u64 = 1;

/// A center frequency, stored as whole hertz.
///
/// The integer form is the identity key: six decimal places of MHz.
/// `Display` renders the three-decimal presentation form (`911.500`);
/// [`Frequency::key`] renders the six-decimal form (`911.500000`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Frequency(u64);

impl Frequency {
    /// Build from whole hertz.
    pub const fn from_hz(hz: u64) -> Self {
        Self(hz)
    }

    /// Build from megahertz, rounding to the nearest hertz.
    ///
    /// Returns `None` for negative, non-finite, or out-of-band input
    /// (above [`MAX_FREQUENCY_MHZ`]).
    pub fn from_mhz(mhz: f64) -> Option<Self> {
        if !mhz.is_finite() || !(0.0..=MAX_FREQUENCY_MHZ).contains(&mhz) {
            return None;
        }
        Some(Self((mhz * HZ_PER_MHZ).round() as u64))
    }

    /// Whole hertz, as passed to the decoder's `-centerfreq`.
    pub fn hz(self) -> u64 {
        self.0
    }

    /// Megahertz as a float, for arithmetic and JSON output.
    pub fn as_mhz(self) -> f64 {
        self.0 as f64 / HZ_PER_MHZ
    }

    /// Round to the nearest kilohertz (three decimals of MHz).
    pub fn rounded_to_khz(self) -> Self {
        Self(self.0.saturating_add(500) / 1000 * 1000)
    }

    /// Absolute distance in hertz.
    pub fn abs_diff(self, other: Frequency) -> u64 {
        self.0.abs_diff(other.0)
    }

    /// True when both name the same center frequency within tolerance.
    pub fn matches(self, other: Frequency) -> bool {
        self.abs_diff(other) <= MATCH_TOLERANCE_HZ
    }

    /// Six-decimal MHz rendering used for the frequency totals table.
    pub fn key(self) -> String {
        format!("{}.{:06}", self.0 / 1_000_000, self.0 % 1_000_000)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let khz = self.rounded_to_khz().0 / 1000;
        write!(f, "{}.{:03}", khz / 1000, khz % 1000)
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mhz: f64 = s
            .trim()
            .parse()
            .map_err(|_| format!("not a frequency: '{}'", s.trim()))?;
        Frequency::from_mhz(mhz).ok_or_else(|| format!("frequency out of range: '{}'", s.trim()))
    }
}

impl Serialize for Frequency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_mhz())
    }
}

impl<'de> Deserialize<'de> for Frequency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mhz = f64::deserialize(deserializer)?;
        Frequency::from_mhz(mhz)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid frequency: {}", mhz)))
    }
}

/// Which kind of cycle is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    /// Focused pass over the core frequency list.
    Core,
    /// Uniform-step discovery sweep.
    Ism,
}

impl fmt::Display for CycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleKind::Core => write!(f, "CORE"),
            CycleKind::Ism => write!(f, "ISM"),
        }
    }
}

/// One decoded observation of a radio on one center frequency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Radio (meter) identifier.
    pub radio_id: u64,
    /// Uppercase message type token, e.g. `SCM` or `R900`.
    pub message_type: String,
    /// Center frequency the decoder was tuned to.
    pub frequency: Frequency,
}

/// Running statistics for one radio within a scan cycle.
#[derive(Debug, Clone, Serialize)]
pub struct RadioStat {
    /// Radio identifier.
    pub id: u64,
    /// Most recently observed message type.
    #[serde(rename = "type")]
    pub last_type: String,
    /// Total observations across all frequencies.
    pub total: u64,
    /// Observations per center frequency.
    #[serde(serialize_with = "serialize_frequency_map")]
    pub per_frequency: BTreeMap<Frequency, u64>,
    /// Creation order within the cycle.
    #[serde(skip)]
    pub first_seen: u64,
}

impl RadioStat {
    /// Creates an empty stat for a radio seen for the first time.
    pub fn new(id: u64, first_seen: u64) -> Self {
        Self {
            id,
            last_type: String::new(),
            total: 0,
            per_frequency: BTreeMap::new(),
            first_seen,
        }
    }

    /// Fold one observation into the stat.
    pub fn record(&mut self, record: &EventRecord) {
        self.total += 1;
        self.last_type.clone_from(&record.message_type);
        *self.per_frequency.entry(record.frequency).or_insert(0) += 1;
    }

    /// Number of distinct center frequencies the radio was heard on.
    pub fn distinct_frequencies(&self) -> usize {
        self.per_frequency.len()
    }
}

fn serialize_frequency_map<S: Serializer>(
    map: &BTreeMap<Frequency, u64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(map.iter().map(|(f, n)| (f.key(), *n)))
}

/// A radio row recovered from a text report.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRadio {
    /// Radio identifier exactly as printed in the report.
    pub id: String,
    /// Message type column.
    pub radio_type: String,
    /// Total messages column.
    pub total_messages: u64,
    /// Distinct frequency count column.
    pub freqs_count: u64,
    /// Observed center frequencies in report order.
    pub center_freqs: Vec<Frequency>,
    /// Core frequency chosen by the assignment pass.
    pub assigned_core: Option<Frequency>,
}

impl ParsedRadio {
    /// Arithmetic mean of the observed frequencies in MHz.
    pub fn mean_mhz(&self) -> Option<f64> {
        if self.center_freqs.is_empty() {
            return None;
        }
        let sum: f64 = self.center_freqs.iter().map(|f| f.as_mhz()).sum();
        Some(sum / self.center_freqs.len() as f64)
    }
}

/// One ranked core frequency in a recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreFrequencyEntry {
    /// 1-based rank by descending traffic.
    pub rank: usize,
    /// The core center frequency.
    #[serde(rename = "freq_mhz", alias = "frequency")]
    pub frequency: Frequency,
    /// Messages observed at this frequency across all radios.
    pub total_messages: u64,
    /// Radios assigned here, strongest first.
    pub radio_ids: Vec<String>,
}
