//! Run-scoped message aggregation.
//!
//! The aggregator owns every per-radio, per-frequency and per-type counter
//! for one scan cycle. It is a plain value with a single writer (the active
//! dwell), so nothing here is synchronized.

use crate::models::{EventRecord, Frequency, RadioStat};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

/// Running statistics for one scan cycle.
#[derive(Debug, Default)]
pub struct Aggregator {
    radios: HashMap<u64, RadioStat>,
    frequency_totals: BTreeMap<Frequency, u64>,
    type_totals: BTreeMap<String, u64>,
    next_seq: u64,
}

impl Aggregator {
    /// Creates an empty aggregator for a new cycle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one accepted record into every counter.
    ///
    /// Returns `true` when the radio had not been seen before in this cycle.
    pub fn record(&mut self, record: &EventRecord) -> bool {
        let mut created = false;
        let seq = self.next_seq;
        let stat = self.radios.entry(record.radio_id).or_insert_with(|| {
            created = true;
            RadioStat::new(record.radio_id, seq)
        });
        stat.record(record);
        if created {
            self.next_seq += 1;
        }

        *self.frequency_totals.entry(record.frequency).or_insert(0) += 1;
        *self
            .type_totals
            .entry(record.message_type.clone())
            .or_insert(0) += 1;

        created
    }

    /// Look up a radio by identifier.
    #[cfg(test)]
    pub fn radio(&self, id: u64) -> Option<&RadioStat> {
        self.radios.get(&id)
    }

    /// Number of distinct radios seen this cycle.
    pub fn radio_count(&self) -> usize {
        self.radios.len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.radios.is_empty()
    }

    /// Messages recorded across the whole cycle.
    pub fn total_messages(&self) -> u64 {
        self.type_totals.values().sum()
    }

    /// Messages per center frequency.
    pub fn frequency_totals(&self) -> &BTreeMap<Frequency, u64> {
        &self.frequency_totals
    }

    /// Radios by descending total; ties keep first-observation order.
    pub fn radios_by_total(&self) -> Vec<&RadioStat> {
        let mut radios: Vec<&RadioStat> = self.radios.values().collect();
        radios.sort_by_key(|r| (Reverse(r.total), r.first_seen));
        radios
    }

    /// Frequencies by descending total, ties by ascending frequency.
    pub fn frequencies_by_total(&self) -> Vec<(Frequency, u64)> {
        let mut freqs: Vec<(Frequency, u64)> = self
            .frequency_totals
            .iter()
            .map(|(f, n)| (*f, *n))
            .collect();
        // BTreeMap order is ascending frequency; the stable sort keeps it for ties
        freqs.sort_by_key(|(_, n)| Reverse(*n));
        freqs
    }

    /// Types by descending total, ties alphabetically.
    pub fn types_by_total(&self) -> Vec<(&str, u64)> {
        let mut types: Vec<(&str, u64)> = self
            .type_totals
            .iter()
            .map(|(t, n)| (t.as_str(), *n))
            .collect();
        types.sort_by_key(|(_, n)| Reverse(*n));
        types
    }

    /// The radio with the most messages, if any.
    pub fn strongest_radio(&self) -> Option<&RadioStat> {
        self.radios_by_total().into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, message_type: &str, mhz: f64) -> EventRecord {
        EventRecord {
            radio_id: id,
            message_type: message_type.to_string(),
            frequency: Frequency::from_mhz(mhz).unwrap(),
        }
    }

    fn sample() -> Aggregator {
        let mut agg = Aggregator::new();
        for rec in [
            record(100, "SCM", 910.2),
            record(200, "R900", 911.5),
            record(100, "SCM", 910.2),
            record(300, "IDM", 910.2),
            record(200, "R900", 912.38),
            record(100, "IDM", 911.5),
        ] {
            agg.record(&rec);
        }
        agg
    }

    #[test]
    fn test_record_creates_and_updates() {
        let mut agg = Aggregator::new();
        assert!(agg.is_empty());
        assert!(agg.record(&record(7, "SCM", 910.2)));
        assert!(!agg.record(&record(7, "IDM", 911.5)));

        let stat = agg.radio(7).unwrap();
        assert_eq!(stat.total, 2);
        assert_eq!(stat.last_type, "IDM");
        assert_eq!(stat.distinct_frequencies(), 2);
        assert_eq!(agg.radio_count(), 1);
    }

    #[test]
    fn test_frequency_totals_match_radio_counts() {
        let agg = sample();
        for (freq, total) in agg.frequency_totals() {
            let sum: u64 = agg
                .radios_by_total()
                .iter()
                .map(|r| r.per_frequency.get(freq).copied().unwrap_or(0))
                .sum();
            assert_eq!(sum, *total, "mismatch at {}", freq);
        }
    }

    #[test]
    fn test_type_totals_match_radio_totals() {
        let agg = sample();
        let radio_sum: u64 = agg.radios_by_total().iter().map(|r| r.total).sum();
        let type_sum: u64 = agg.types_by_total().iter().map(|(_, n)| n).sum();
        assert_eq!(radio_sum, type_sum);
        assert_eq!(agg.total_messages(), 6);

        for stat in agg.radios_by_total() {
            assert_eq!(stat.per_frequency.values().sum::<u64>(), stat.total);
        }
    }

    #[test]
    fn test_radios_by_total_tie_break_is_first_seen() {
        let agg = sample();
        let ids: Vec<u64> = agg.radios_by_total().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![100, 200, 300]);

        let mut tied = Aggregator::new();
        tied.record(&record(9, "SCM", 910.2));
        tied.record(&record(3, "SCM", 910.2));
        tied.record(&record(5, "SCM", 910.2));
        let ids: Vec<u64> = tied.radios_by_total().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![9, 3, 5]);
    }

    #[test]
    fn test_frequencies_by_total() {
        let agg = sample();
        let freqs = agg.frequencies_by_total();
        assert_eq!(freqs[0], (Frequency::from_mhz(910.2).unwrap(), 3));
        assert_eq!(freqs[1], (Frequency::from_mhz(911.5).unwrap(), 2));
        assert_eq!(freqs[2], (Frequency::from_mhz(912.38).unwrap(), 1));
    }

    #[test]
    fn test_frequencies_tie_break_ascending() {
        let mut agg = Aggregator::new();
        agg.record(&record(1, "SCM", 915.5));
        agg.record(&record(1, "SCM", 910.2));
        let freqs: Vec<Frequency> = agg.frequencies_by_total().into_iter().map(|(f, _)| f).collect();
        assert_eq!(
            freqs,
            vec![
                Frequency::from_mhz(910.2).unwrap(),
                Frequency::from_mhz(915.5).unwrap()
            ]
        );
    }

    #[test]
    fn test_types_by_total() {
        let agg = sample();
        let types = agg.types_by_total();
        // IDM and R900 tie at 2; alphabetical order wins
        assert_eq!(types, vec![("IDM", 2), ("R900", 2), ("SCM", 2)]);
    }

    #[test]
    fn test_strongest_radio() {
        assert!(Aggregator::new().strongest_radio().is_none());
        assert_eq!(sample().strongest_radio().map(|r| r.id), Some(100));
    }
}
