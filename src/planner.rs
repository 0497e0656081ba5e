//! Frequency planning.
//!
//! Builds the ordered list of center frequencies a cycle visits: the
//! built-in core bandplan, an operator-supplied list, a list loaded from a
//! previous recommendation, or a uniform ISM sweep.

use crate::config::expand_home;
use crate::error::{ScanError, ScanResult};
use crate::models::{CycleKind, Frequency, MAX_FREQUENCY_MHZ};
use chrono::{DateTime, Duration as ChronoDuration, Local};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Lower edge of the FCC 902-928 MHz ISM allocation.
pub const DEFAULT_ISM_MIN_MHZ: f64 = 902.0;
/// Upper edge of the ISM allocation.
pub const DEFAULT_ISM_MAX_MHZ: f64 = 928.0;
/// Default sweep step.
pub const DEFAULT_ISM_STEP_KHZ: f64 = 300.0;

/// Shortest ISM dwell worth running.
pub const ISM_DWELL_MIN_SECONDS: u64 = 5;
/// Longest ISM dwell; longer dwells belong in a core scan.
pub const ISM_DWELL_MAX_SECONDS: u64 = 120;

/// Slack on the upper sweep edge for accumulated float error.
const SWEEP_EPSILON_MHZ: f64 = 1e-9;

/// Refuse sweeps that would take absurdly many dwells.
const MAX_SWEEP_POINTS: f64 = 100_000.0;

/// The built-in core R900 center frequencies.
pub fn default_core_frequencies() -> Vec<Frequency> {
    [
        910_200_000,
        911_500_000,
        912_380_000,
        914_000_000,
        915_500_000,
        916_600_000,
        918_000_000,
    ]
    .into_iter()
    .map(Frequency::from_hz)
    .collect()
}

/// Build a uniform sweep from `min_mhz` to `max_mhz` (inclusive) in
/// `step_khz` steps, each entry rounded to the nearest kHz.
pub fn build_sweep(min_mhz: f64, max_mhz: f64, step_khz: f64) -> ScanResult<Vec<Frequency>> {
    if !step_khz.is_finite() || step_khz <= 0.0 {
        return Err(ScanError::Config(format!(
            "sweep step must be > 0 kHz (got {})",
            step_khz
        )));
    }
    if !min_mhz.is_finite()
        || !max_mhz.is_finite()
        || min_mhz < 0.0
        || max_mhz > MAX_FREQUENCY_MHZ
    {
        return Err(ScanError::Config(format!(
            "invalid sweep window {}-{} MHz",
            min_mhz, max_mhz
        )));
    }
    if min_mhz >= max_mhz {
        return Err(ScanError::Config(format!(
            "sweep minimum {} MHz must be below maximum {} MHz",
            min_mhz, max_mhz
        )));
    }

    let step_mhz = step_khz / 1000.0;
    if (max_mhz - min_mhz) / step_mhz > MAX_SWEEP_POINTS {
        return Err(ScanError::Config(format!(
            "sweep of {}-{} MHz at {} kHz has too many steps",
            min_mhz, max_mhz, step_khz
        )));
    }

    let mut freqs = Vec::new();
    let mut index: u64 = 0;
    loop {
        let mhz = min_mhz + index as f64 * step_mhz;
        if mhz > max_mhz + SWEEP_EPSILON_MHZ {
            break;
        }
        if let Some(freq) = Frequency::from_mhz(mhz) {
            freqs.push(freq.rounded_to_khz());
        }
        index += 1;
    }

    // Sub-kHz steps can round two neighbours onto the same kHz.
    freqs.dedup();
    Ok(freqs)
}

#[derive(Debug, Deserialize)]
struct RecommendationFile {
    #[serde(default)]
    core_freqs: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CoreEntryRef {
    #[serde(default)]
    rank: Option<usize>,
    #[serde(alias = "frequency")]
    freq_mhz: Frequency,
}

/// Load the core frequencies of a `core_freqs.json` recommendation, in rank
/// order. Entries without a usable frequency are skipped.
pub fn load_from_recommendation(path: &Path) -> ScanResult<Vec<Frequency>> {
    let path = expand_home(path);
    let content = std::fs::read_to_string(&path).map_err(|e| {
        ScanError::Config(format!(
            "failed to read core frequencies file {}: {}",
            path.display(),
            e
        ))
    })?;

    let file: RecommendationFile = serde_json::from_str(&content).map_err(|e| {
        ScanError::Config(format!(
            "failed to parse core frequencies file {}: {}",
            path.display(),
            e
        ))
    })?;

    let mut entries: Vec<CoreEntryRef> = file
        .core_freqs
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping core entry: {}", e);
                None
            }
        })
        .collect();

    if entries.is_empty() {
        return Err(ScanError::Config(format!(
            "no usable core frequencies found in {}",
            path.display()
        )));
    }

    entries.sort_by_key(|entry| entry.rank.unwrap_or(usize::MAX));
    Ok(entries.into_iter().map(|entry| entry.freq_mhz).collect())
}

/// Parse a comma-separated MHz list, skipping chunks that do not parse.
pub fn parse_frequency_list(list: &str) -> Vec<Frequency> {
    list.split(',')
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .filter_map(|chunk| match chunk.parse::<Frequency>() {
            Ok(freq) => Some(freq),
            Err(e) => {
                warn!("Ignoring {}", e);
                None
            }
        })
        .collect()
}

/// Where the core frequency list came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreSource {
    Recommendation(PathBuf),
    Manual,
    Default,
}

impl fmt::Display for CoreSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreSource::Recommendation(path) => write!(f, "recommendation {}", path.display()),
            CoreSource::Manual => write!(f, "custom list"),
            CoreSource::Default => write!(f, "built-in defaults"),
        }
    }
}

/// Core frequency inputs supplied by the operator.
#[derive(Debug, Clone, Default)]
pub struct FrequencySources {
    /// `core_freqs.json` from a previous analysis.
    pub recommendation: Option<PathBuf>,
    /// Comma-separated MHz list.
    pub manual: Option<String>,
}

impl FrequencySources {
    /// Pick the core list: recommendation file, then manual list, then the
    /// built-in defaults. A manual list that yields nothing falls back to
    /// the defaults.
    pub fn resolve(&self) -> ScanResult<(CoreSource, Vec<Frequency>)> {
        if let Some(ref path) = self.recommendation {
            let freqs = load_from_recommendation(path)?;
            info!("Loaded {} core frequencies from {}", freqs.len(), path.display());
            return Ok((CoreSource::Recommendation(path.clone()), freqs));
        }

        if let Some(ref list) = self.manual {
            let freqs = parse_frequency_list(list);
            if !freqs.is_empty() {
                info!("Using {} custom core frequencies", freqs.len());
                return Ok((CoreSource::Manual, freqs));
            }
            warn!("No valid frequencies parsed from '{}'; falling back to defaults", list);
        }

        Ok((CoreSource::Default, default_core_frequencies()))
    }
}

/// Message-type selection, split into the decoder argument and the
/// internal filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTypeFilter {
    /// Value passed to the decoder's `-msgtype`.
    pub selector: String,
    /// Uppercase types kept by the aggregator; `None` keeps everything.
    pub accepted: Option<BTreeSet<String>>,
}

impl Default for MessageTypeFilter {
    fn default() -> Self {
        Self {
            selector: "all".to_string(),
            accepted: None,
        }
    }
}

impl MessageTypeFilter {
    /// Interpret a raw `--msgtype` value such as `all` or `scm,idm`.
    pub fn from_arg(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Self::default();
        }

        let parts: Vec<&str> = trimmed
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            return Self::default();
        }

        Self {
            selector: parts.join(","),
            accepted: Some(parts.iter().map(|p| p.to_uppercase()).collect()),
        }
    }

    /// Whether a record of this (uppercase) type is kept.
    pub fn accepts(&self, message_type: &str) -> bool {
        match self.accepted {
            Some(ref set) => set.contains(message_type),
            None => true,
        }
    }

    /// Human-readable description of the internal filter.
    pub fn describe(&self) -> String {
        match self.accepted {
            Some(ref set) => set.iter().cloned().collect::<Vec<_>>().join(", "),
            None => "ALL types".to_string(),
        }
    }
}

/// Clamp an ISM dwell into the supported window, warning when it moves.
pub fn clamp_ism_dwell(seconds: u64) -> u64 {
    let clamped = seconds.clamp(ISM_DWELL_MIN_SECONDS, ISM_DWELL_MAX_SECONDS);
    if clamped != seconds {
        warn!(
            "ISM dwell of {}s is outside {}-{}s; clamping to {}s",
            seconds, ISM_DWELL_MIN_SECONDS, ISM_DWELL_MAX_SECONDS, clamped
        );
    }
    clamped
}

const ETA_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format seconds as `H:MM:SS`.
pub fn format_hms(total_seconds: u64) -> String {
    let h = total_seconds / 3600;
    let m = (total_seconds % 3600) / 60;
    let s = total_seconds % 60;
    format!("{}:{:02}:{:02}", h, m, s)
}

/// The ordered dwells of one cycle.
#[derive(Debug, Clone)]
pub struct CyclePlan {
    pub kind: CycleKind,
    pub frequencies: Vec<Frequency>,
    pub dwell_seconds: u64,
}

impl CyclePlan {
    /// Seconds spent dwelling on `remaining` frequencies.
    pub fn seconds_for(&self, remaining: usize) -> u64 {
        (remaining as u64).saturating_mul(self.dwell_seconds)
    }

    /// Best-effort duration of the whole cycle.
    pub fn total_seconds(&self) -> u64 {
        self.seconds_for(self.frequencies.len())
    }

    /// Wall-clock finish time if `remaining` dwells start at `now`.
    ///
    /// `None` when the finish lies beyond what a timestamp can hold.
    pub fn eta(&self, now: DateTime<Local>, remaining: usize) -> Option<DateTime<Local>> {
        let seconds = i64::try_from(self.seconds_for(remaining)).ok()?;
        now.checked_add_signed(ChronoDuration::try_seconds(seconds)?)
    }
}

/// Render an ETA as `YYYY-MM-DD HH:MM:SS`, or `unknown`.
pub fn format_eta(eta: Option<DateTime<Local>>) -> String {
    match eta {
        Some(t) => t.format(ETA_FORMAT).to_string(),
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn mhz(v: f64) -> Frequency {
        Frequency::from_mhz(v).unwrap()
    }

    #[test]
    fn test_default_core_frequencies() {
        let freqs = default_core_frequencies();
        assert_eq!(freqs.len(), 7);
        assert_eq!(freqs[0], mhz(910.2));
        assert_eq!(freqs[6], mhz(918.0));
    }

    #[test]
    fn test_build_sweep_default_window() {
        let freqs = build_sweep(902.0, 928.0, 300.0).unwrap();
        assert_eq!(freqs.first(), Some(&mhz(902.0)));
        // 902.0 + 86 * 0.3 = 927.8
        assert_eq!(freqs.last(), Some(&mhz(927.8)));
        assert_eq!(freqs.len(), 87);
        assert!(freqs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_build_sweep_includes_max_despite_round_off() {
        let freqs = build_sweep(902.0, 903.0, 100.0).unwrap();
        assert_eq!(freqs.len(), 11);
        assert_eq!(freqs.last(), Some(&mhz(903.0)));
    }

    #[test]
    fn test_build_sweep_properties() {
        for &(min, max, step) in &[
            (902.0, 928.0, 300.0),
            (910.0, 911.0, 0.4),
            (915.123, 915.9, 77.7),
            (100.0, 100.5, 250.0),
        ] {
            let freqs = build_sweep(min, max, step).unwrap();
            assert_eq!(freqs[0], Frequency::from_mhz(min).unwrap().rounded_to_khz());
            assert!(freqs.windows(2).all(|w| w[0] < w[1]));
            let last = freqs.last().unwrap().as_mhz();
            assert!(last <= max + 0.0005);
            assert!(max - last <= step / 1000.0 + 0.0005);
        }
    }

    #[test]
    fn test_build_sweep_rejects_bad_input() {
        assert!(matches!(build_sweep(902.0, 928.0, 0.0), Err(ScanError::Config(_))));
        assert!(matches!(build_sweep(902.0, 928.0, -5.0), Err(ScanError::Config(_))));
        assert!(matches!(build_sweep(928.0, 902.0, 300.0), Err(ScanError::Config(_))));
        assert!(matches!(build_sweep(910.0, 910.0, 300.0), Err(ScanError::Config(_))));
        assert!(matches!(
            build_sweep(0.0, 6000.0, 0.001),
            Err(ScanError::Config(_))
        ));
        assert!(matches!(
            build_sweep(902.0, 20_000_000_000_000.0, 300.0),
            Err(ScanError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_recommendation_orders_by_rank() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("core_freqs.json");
        std::fs::write(
            &path,
            r#"{
  "generated_by": "amrscan-analyze",
  "version": 1,
  "core_freqs": [
    { "rank": 2, "freq_mhz": 912.2, "total_messages": 10, "radio_ids": [] },
    { "rank": 1, "freq_mhz": 911.6, "total_messages": 40, "radio_ids": ["1"] },
    { "rank": 3, "freq_mhz": "nope" },
    { "rank": 4, "frequency": 915.5 }
  ]
}"#,
        )
        .unwrap();

        let freqs = load_from_recommendation(&path).unwrap();
        assert_eq!(freqs, vec![mhz(911.6), mhz(912.2), mhz(915.5)]);
    }

    #[test]
    fn test_load_from_recommendation_errors() {
        let dir = TempDir::new().unwrap();

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            load_from_recommendation(&missing),
            Err(ScanError::Config(_))
        ));

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "not json").unwrap();
        assert!(matches!(
            load_from_recommendation(&garbage),
            Err(ScanError::Config(_))
        ));

        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, r#"{"core_freqs": [{"rank": 1}]}"#).unwrap();
        assert!(matches!(
            load_from_recommendation(&empty),
            Err(ScanError::Config(_))
        ));
    }

    #[test]
    fn test_parse_frequency_list() {
        let freqs = parse_frequency_list("910.2, 911.5,,bogus, 918");
        assert_eq!(freqs, vec![mhz(910.2), mhz(911.5), mhz(918.0)]);
        assert!(parse_frequency_list(" , ").is_empty());
        assert_eq!(
            parse_frequency_list("20000000000000, 911.5"),
            vec![mhz(911.5)]
        );
    }

    #[test]
    fn test_resolve_precedence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("core_freqs.json");
        std::fs::write(&path, r#"{"core_freqs": [{"rank": 1, "freq_mhz": 913.0}]}"#).unwrap();

        let sources = FrequencySources {
            recommendation: Some(path.clone()),
            manual: Some("910.2".to_string()),
        };
        let (source, freqs) = sources.resolve().unwrap();
        assert_eq!(source, CoreSource::Recommendation(path));
        assert_eq!(freqs, vec![mhz(913.0)]);

        let sources = FrequencySources {
            recommendation: None,
            manual: Some("910.2, 911.5".to_string()),
        };
        let (source, freqs) = sources.resolve().unwrap();
        assert_eq!(source, CoreSource::Manual);
        assert_eq!(freqs, vec![mhz(910.2), mhz(911.5)]);

        let sources = FrequencySources {
            recommendation: None,
            manual: Some("junk".to_string()),
        };
        let (source, freqs) = sources.resolve().unwrap();
        assert_eq!(source, CoreSource::Default);
        assert_eq!(freqs, default_core_frequencies());

        let (source, _) = FrequencySources::default().resolve().unwrap();
        assert_eq!(source, CoreSource::Default);
    }

    #[test]
    fn test_resolve_bad_recommendation_is_fatal() {
        let sources = FrequencySources {
            recommendation: Some(PathBuf::from("/nonexistent/core_freqs.json")),
            manual: Some("910.2".to_string()),
        };
        assert!(matches!(sources.resolve(), Err(ScanError::Config(_))));
    }

    #[test]
    fn test_message_type_filter() {
        let all = MessageTypeFilter::from_arg("ALL");
        assert_eq!(all.selector, "all");
        assert!(all.accepted.is_none());
        assert!(all.accepts("SCM"));

        assert_eq!(MessageTypeFilter::from_arg(""), MessageTypeFilter::default());
        assert_eq!(MessageTypeFilter::from_arg(" , "), MessageTypeFilter::default());

        let some = MessageTypeFilter::from_arg(" scm, idm ,r900");
        assert_eq!(some.selector, "scm,idm,r900");
        assert!(some.accepts("SCM"));
        assert!(some.accepts("R900"));
        assert!(!some.accepts("NET"));
        assert_eq!(some.describe(), "IDM, R900, SCM");
    }

    #[test]
    fn test_clamp_ism_dwell() {
        assert_eq!(clamp_ism_dwell(1), 5);
        assert_eq!(clamp_ism_dwell(30), 30);
        assert_eq!(clamp_ism_dwell(600), 120);
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(0), "0:00:00");
        assert_eq!(format_hms(61), "0:01:01");
        assert_eq!(format_hms(3 * 3600 + 5 * 60 + 9), "3:05:09");
    }

    #[test]
    fn test_cycle_plan_estimate() {
        let plan = CyclePlan {
            kind: CycleKind::Core,
            frequencies: default_core_frequencies(),
            dwell_seconds: 120,
        };
        assert_eq!(plan.total_seconds(), 840);

        let now = Local.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let eta = plan.eta(now, 2);
        assert_eq!(eta, Some(Local.with_ymd_and_hms(2024, 1, 1, 12, 4, 0).unwrap()));
        assert_eq!(format_eta(eta), "2024-01-01 12:04:00");
    }

    #[test]
    fn test_cycle_plan_estimate_out_of_range() {
        let plan = CyclePlan {
            kind: CycleKind::Core,
            frequencies: default_core_frequencies(),
            dwell_seconds: 10_000_000_000_000_000,
        };
        let now = Local.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        assert_eq!(plan.seconds_for(7), 70_000_000_000_000_000);
        assert_eq!(plan.eta(now, 7), None);
        assert_eq!(format_eta(plan.eta(now, 7)), "unknown");

        let plan = CyclePlan {
            dwell_seconds: u64::MAX,
            ..plan
        };
        assert_eq!(plan.total_seconds(), u64::MAX);
        assert_eq!(plan.eta(now, 2), None);
    }
}
