//! Core frequency selection and radio assignment.
//!
//! Picks the strongest center frequencies from a parsed report and gives
//! every radio exactly one of them to be monitored on.

use crate::models::{CoreFrequencyEntry, Frequency, ParsedRadio};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, HashMap};

/// Top `k` frequencies by descending total, ties by ascending frequency.
pub fn choose_core(totals: &BTreeMap<Frequency, u64>, k: usize) -> Vec<Frequency> {
    let mut items: Vec<(Frequency, u64)> = totals.iter().map(|(f, n)| (*f, *n)).collect();
    items.sort_by_key(|(f, n)| (Reverse(*n), *f));
    items.into_iter().take(k).map(|(f, _)| f).collect()
}

/// Result of assigning radios to core frequencies.
#[derive(Debug, Clone)]
pub struct CoreAssignment {
    core: Vec<Frequency>,
    by_core: BTreeMap<Frequency, Vec<usize>>,
}

impl CoreAssignment {
    /// Core frequencies in rank order.
    pub fn core(&self) -> &[Frequency] {
        &self.core
    }

    /// Indices (into the radio slice) assigned to `freq`, strongest first.
    pub fn radios_for(&self, freq: Frequency) -> &[usize] {
        self.by_core.get(&freq).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 1-based position of each radio index within its core list.
    pub fn ranks_within_core(&self) -> HashMap<usize, usize> {
        self.by_core
            .values()
            .flat_map(|list| list.iter().enumerate().map(|(pos, idx)| (*idx, pos + 1)))
            .collect()
    }
}

/// Assign every radio to one core frequency and record it on the radio.
///
/// - No observed frequencies: the strongest core.
/// - Observed frequencies matching core entries: the matching core with
///   the highest global total, ties to the lower frequency.
/// - Otherwise: the core closest to the mean observed frequency, ties to
///   the earlier core.
///
/// Radios are left untouched when `core` is empty.
pub fn assign(
    radios: &mut [ParsedRadio],
    core: &[Frequency],
    totals: &BTreeMap<Frequency, u64>,
) -> CoreAssignment {
    let mut by_core: BTreeMap<Frequency, Vec<usize>> =
        core.iter().map(|f| (*f, Vec::new())).collect();

    if !core.is_empty() {
        for (idx, radio) in radios.iter_mut().enumerate() {
            let assigned = pick_core(radio, core, totals);
            radio.assigned_core = Some(assigned);
            by_core.entry(assigned).or_default().push(idx);
        }
    }

    for list in by_core.values_mut() {
        list.sort_by(|&a, &b| compare_strength(&radios[a], &radios[b]));
    }

    CoreAssignment {
        core: core.to_vec(),
        by_core,
    }
}

/// Descending total messages, then ascending id.
pub fn compare_strength(a: &ParsedRadio, b: &ParsedRadio) -> Ordering {
    b.total_messages
        .cmp(&a.total_messages)
        .then_with(|| a.id.cmp(&b.id))
}

fn pick_core(radio: &ParsedRadio, core: &[Frequency], totals: &BTreeMap<Frequency, u64>) -> Frequency {
    let Some(mean_mhz) = radio.mean_mhz() else {
        return core[0];
    };

    let total_of = |f: &Frequency| totals.get(f).copied().unwrap_or(0);

    let best_hit = radio
        .center_freqs
        .iter()
        .filter_map(|observed| core.iter().copied().find(|c| c.matches(*observed)))
        .max_by(|a, b| total_of(a).cmp(&total_of(b)).then_with(|| b.cmp(a)));
    if let Some(hit) = best_hit {
        return hit;
    }

    let mut nearest = core[0];
    let mut nearest_distance = (nearest.as_mhz() - mean_mhz).abs();
    for &candidate in &core[1..] {
        let distance = (candidate.as_mhz() - mean_mhz).abs();
        if distance < nearest_distance {
            nearest = candidate;
            nearest_distance = distance;
        }
    }
    nearest
}

/// Build the ranked core entries for a finished assignment.
pub fn core_entries(
    radios: &[ParsedRadio],
    assignment: &CoreAssignment,
    totals: &BTreeMap<Frequency, u64>,
) -> Vec<CoreFrequencyEntry> {
    assignment
        .core()
        .iter()
        .enumerate()
        .map(|(pos, freq)| CoreFrequencyEntry {
            rank: pos + 1,
            frequency: *freq,
            total_messages: totals.get(freq).copied().unwrap_or(0),
            radio_ids: assignment
                .radios_for(*freq)
                .iter()
                .map(|idx| radios[*idx].id.clone())
                .collect(),
        })
        .collect()
}
