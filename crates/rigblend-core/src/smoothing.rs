//! Exponential weight smoothing over the normalized weights.
//!
//! The table is a side structure keyed by sampler handle, parallel to
//! the blend slots. It survives detach: a contributor whose sequence
//! has let go keeps its slot parked (priority zeroed) and fades toward
//! zero here before the slot is physically removed. Entries are
//! recycled in place, never removed individually.

use serde::{Deserialize, Serialize};

use crate::blend::BlendSlotArray;
use crate::config::Config;
use crate::ids::{SamplerId, SequenceId};

/// Sentinel meaning "no smoothed weight observed yet".
pub const UNSET_WEIGHT: f32 = f32::NEG_INFINITY;

/// Lifecycle direction driving the snap rules.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpState {
    #[default]
    NotSet,
    Activating,
    Deactivating,
}

/// Diagnostic label recording how the entry last changed hands.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmoothPhase {
    #[default]
    NotSet,
    AttachedNormally,
    ReattachedWhileSmoothing,
    DetachedButSmoothing,
    RemovedInDetach,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SmoothingEntry {
    /// Occupied while `Some`; a free entry awaits recycling.
    pub sampler: Option<SamplerId>,
    pub sequence: Option<SequenceId>,
    pub state: InterpState,
    pub phase: SmoothPhase,
    pub smoothed_weight: f32,
    /// The owning sequence has detached; fade toward zero.
    pub detached: bool,
    /// Index into the target's blend slot array.
    pub slot: Option<usize>,
    /// Entry belongs to the target's stationary pose sampler.
    pub is_pose: bool,
    /// Additive contributors smooth a weight multiplier instead.
    pub additive: bool,
    pub target_mult: f32,
    pub smoothed_mult: f32,
}

impl SmoothingEntry {
    fn free() -> Self {
        Self {
            sampler: None,
            sequence: None,
            state: InterpState::NotSet,
            phase: SmoothPhase::NotSet,
            smoothed_weight: UNSET_WEIGHT,
            detached: false,
            slot: None,
            is_pose: false,
            additive: false,
            target_mult: 1.0,
            smoothed_mult: 1.0,
        }
    }

    #[inline]
    pub fn occupied(&self) -> bool {
        self.sampler.is_some()
    }
}

/// Per-target table of smoothing entries.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SmoothingTable {
    entries: Vec<SmoothingEntry>,
}

impl SmoothingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, sampler: SamplerId) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.sampler == Some(sampler))
    }

    /// Entry for `sampler`, recycling a free one or growing the table.
    /// An existing entry for the same sampler is returned untouched so
    /// a reattach sees its in-flight smoothed weight.
    pub fn obtain(&mut self, sampler: SamplerId) -> usize {
        if let Some(i) = self.find(sampler) {
            return i;
        }
        let i = match self.entries.iter().position(|e| !e.occupied()) {
            Some(i) => i,
            None => {
                self.entries.push(SmoothingEntry::free());
                self.entries.len() - 1
            }
        };
        self.entries[i] = SmoothingEntry {
            sampler: Some(sampler),
            ..SmoothingEntry::free()
        };
        i
    }

    #[inline]
    pub fn entry(&self, index: usize) -> Option<&SmoothingEntry> {
        self.entries.get(index).filter(|e| e.occupied())
    }

    #[inline]
    pub fn entry_mut(&mut self, index: usize) -> Option<&mut SmoothingEntry> {
        self.entries.get_mut(index).filter(|e| e.occupied())
    }

    /// Release an entry for recycling.
    pub fn clear(&mut self, index: usize) {
        if let Some(e) = self.entries.get_mut(index) {
            *e = SmoothingEntry::free();
        }
    }

    pub fn iter_occupied(&self) -> impl Iterator<Item = (usize, &SmoothingEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.occupied())
    }
}

/// Exponential approach rate for a frame of `dt` seconds.
#[inline]
pub fn smoothing_rate(dt: f32, half_life: f32) -> f32 {
    if half_life <= 0.0 {
        return 1.0;
    }
    1.0 - (-dt / half_life).exp()
}

/// One smoothing pass over a target's table.
///
/// Overwrites each slot's normalized weight with its smoothed value.
/// Fully faded detached contributors have their slot removed and their
/// entry recycled; their samplers are appended to `removed` so the
/// caller can emit events and drop a pose sampler left alone.
pub fn apply(
    table: &mut SmoothingTable,
    blend: &mut BlendSlotArray,
    dt: f32,
    cfg: &Config,
    removed: &mut Vec<(SamplerId, Option<SequenceId>)>,
) {
    let rate = smoothing_rate(dt, cfg.smoothing_half_life);
    for entry in table.entries.iter_mut().filter(|e| e.occupied()) {
        if entry.additive {
            if entry.smoothed_mult == UNSET_WEIGHT {
                entry.smoothed_mult = entry.target_mult;
            } else {
                entry.smoothed_mult += (entry.target_mult - entry.smoothed_mult) * rate;
            }
            continue;
        }

        let Some(slot_index) = entry.slot else {
            continue;
        };
        let raw = if entry.detached {
            0.0
        } else {
            match blend.slot(slot_index) {
                Some(slot) => slot.normalized_weight,
                None => continue,
            }
        };

        if entry.smoothed_weight == UNSET_WEIGHT {
            entry.smoothed_weight = raw;
        } else {
            entry.smoothed_weight += (raw - entry.smoothed_weight) * rate;
        }

        if entry.smoothed_weight < cfg.min_smoothed_weight
            && entry.state == InterpState::Deactivating
        {
            entry.smoothed_weight = 0.0;
            if entry.detached {
                blend.remove_slot(slot_index);
                if let Some(sampler) = entry.sampler {
                    removed.push((sampler, entry.sequence));
                }
                *entry = SmoothingEntry::free();
                continue;
            }
        } else if entry.smoothed_weight > cfg.full_weight_snap
            && entry.state == InterpState::Activating
        {
            entry.smoothed_weight = 1.0;
        }

        if let Some(slot) = blend.slot_mut(slot_index) {
            slot.normalized_weight = entry.smoothed_weight;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config::default()
    }

    #[test]
    fn first_observation_seeds_without_lag() {
        let mut table = SmoothingTable::new();
        let mut blend = BlendSlotArray::new(&cfg());
        let slot = blend.add_slot(SamplerId(0), 1.0, 1.0, 1, false);
        blend.set_update(slot, 1.0, 1.0, 0.0);
        blend.compute_normalized_weights();

        let e = table.obtain(SamplerId(0));
        let entry = table.entry_mut(e).unwrap();
        entry.slot = Some(slot);
        entry.state = InterpState::Activating;

        let mut removed = Vec::new();
        apply(&mut table, &mut blend, 0.016, &cfg(), &mut removed);
        assert_eq!(blend.slot(slot).unwrap().normalized_weight, 1.0);
        assert!(removed.is_empty());
    }

    #[test]
    fn detached_entry_fades_and_is_removed() {
        let config = cfg();
        let mut table = SmoothingTable::new();
        let mut blend = BlendSlotArray::new(&config);
        let slot = blend.add_slot(SamplerId(7), 1.0, 1.0, 1, false);
        blend.set_update(slot, 1.0, 1.0, 0.0);
        blend.compute_normalized_weights();

        let e = table.obtain(SamplerId(7));
        {
            let entry = table.entry_mut(e).unwrap();
            entry.slot = Some(slot);
            entry.state = InterpState::Deactivating;
            entry.detached = true;
            entry.smoothed_weight = 0.5;
        }

        let mut removed = Vec::new();
        for _ in 0..200 {
            apply(&mut table, &mut blend, 0.016, &config, &mut removed);
            if !removed.is_empty() {
                break;
            }
        }
        assert_eq!(removed, vec![(SamplerId(7), None)]);
        assert!(blend.slot(slot).is_none());
        assert!(table.find(SamplerId(7)).is_none());
    }

    #[test]
    fn activating_entry_snaps_to_full_weight() {
        let config = cfg();
        let mut table = SmoothingTable::new();
        let mut blend = BlendSlotArray::new(&config);
        let slot = blend.add_slot(SamplerId(1), 1.0, 1.0, 1, false);
        blend.set_update(slot, 1.0, 1.0, 0.0);
        blend.compute_normalized_weights();

        let e = table.obtain(SamplerId(1));
        {
            let entry = table.entry_mut(e).unwrap();
            entry.slot = Some(slot);
            entry.state = InterpState::Activating;
            entry.smoothed_weight = 0.9995;
        }

        let mut removed = Vec::new();
        apply(&mut table, &mut blend, 0.016, &config, &mut removed);
        assert_eq!(blend.slot(slot).unwrap().normalized_weight, 1.0);
    }

    #[test]
    fn obtain_returns_existing_entry_for_reattach() {
        let mut table = SmoothingTable::new();
        let a = table.obtain(SamplerId(3));
        table.entry_mut(a).unwrap().smoothed_weight = 0.42;
        let b = table.obtain(SamplerId(3));
        assert_eq!(a, b);
        assert_eq!(table.entry(b).unwrap().smoothed_weight, 0.42);
    }

    #[test]
    fn cleared_entries_are_recycled() {
        let mut table = SmoothingTable::new();
        let a = table.obtain(SamplerId(0));
        let _b = table.obtain(SamplerId(1));
        table.clear(a);
        let c = table.obtain(SamplerId(2));
        assert_eq!(c, a);
    }
}
