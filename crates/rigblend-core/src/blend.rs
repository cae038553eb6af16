//! Per-target blend slots, normalized weight computation, and value
//! blending.
//!
//! Each target owns one `BlendSlotArray`. Sequences push raw weight,
//! ease spinner, and warped sample time into the slots they hold; the
//! engine then normalizes weights across two priority bands, smooths
//! them, and blends the sampled values into one transform per target.

use serde::{Deserialize, Serialize};

use crate::config::{Config, WeightMode};
use crate::ids::SamplerId;
use crate::interp::Sampler;
use crate::scratch::Scratch;
use crate::transform::{quat_dot, BoneTransform, Quat};

/// Guard for weight-pool divisions. Accumulation runs in f64.
pub const WEIGHT_EPSILON: f64 = 1e-10;

/// Tolerance for "the high band already sums to full weight".
const HIGH_SUM_EPSILON: f32 = 0.001;

/// Sentinel marking the cached band accumulators as stale.
const UNSET_SUM: f32 = f32::NEG_INFINITY;

/// One contributor's handle on a target.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BlendSlot {
    /// Occupied while `Some`; a free slot awaits reuse.
    pub sampler: Option<SamplerId>,
    pub weight: f32,
    pub ease_spinner: f32,
    pub priority: u8,
    pub normalized_weight: f32,
    /// Warped sample time for this frame. `None` means the contributor
    /// produced no sample and is excluded from every weight pool.
    pub update_time: Option<f32>,
    /// Additive contributors bypass normalization entirely.
    pub additive: bool,
}

impl BlendSlot {
    fn free() -> Self {
        Self {
            sampler: None,
            weight: 0.0,
            ease_spinner: 0.0,
            priority: 0,
            normalized_weight: 0.0,
            update_time: None,
            additive: false,
        }
    }

    #[inline]
    fn occupied(&self) -> bool {
        self.sampler.is_some()
    }
}

/// Slot storage plus the memoized normalization state.
#[derive(Clone, Debug)]
pub struct BlendSlotArray {
    slots: Vec<BlendSlot>,
    weight_threshold: f32,
    mode: WeightMode,
    needs_recompute: bool,
    // Cached band accumulators, UNSET_SUM when stale.
    high_priority: u8,
    next_high_priority: u8,
    high_sum: f32,
    next_high_sum: f32,
    high_ease_spinner: f32,
}

impl BlendSlotArray {
    pub fn new(cfg: &Config) -> Self {
        Self {
            slots: Vec::with_capacity(cfg.slot_capacity),
            weight_threshold: cfg.weight_threshold,
            mode: cfg.weight_mode,
            needs_recompute: false,
            high_priority: 0,
            next_high_priority: 0,
            high_sum: UNSET_SUM,
            next_high_sum: UNSET_SUM,
            high_ease_spinner: UNSET_SUM,
        }
    }

    /// Occupy a slot for a new contributor, reusing a free one if any.
    /// Returns the slot index, stable for the contributor's lifetime.
    pub fn add_slot(
        &mut self,
        sampler: SamplerId,
        weight: f32,
        ease_spinner: f32,
        priority: u8,
        additive: bool,
    ) -> usize {
        self.mark_dirty();
        let slot = BlendSlot {
            sampler: Some(sampler),
            weight,
            ease_spinner,
            priority,
            normalized_weight: 0.0,
            update_time: None,
            additive,
        };
        if let Some(i) = self.slots.iter().position(|s| !s.occupied()) {
            self.slots[i] = slot;
            i
        } else {
            self.slots.push(slot);
            self.slots.len() - 1
        }
    }

    /// Release a slot for reuse.
    pub fn remove_slot(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = BlendSlot::free();
            self.mark_dirty();
        }
    }

    #[inline]
    pub fn slot(&self, index: usize) -> Option<&BlendSlot> {
        self.slots.get(index).filter(|s| s.occupied())
    }

    /// Mutable access to an occupied slot; marks weights stale.
    #[inline]
    pub fn slot_mut(&mut self, index: usize) -> Option<&mut BlendSlot> {
        self.mark_dirty();
        self.slots.get_mut(index).filter(|s| s.occupied())
    }

    /// Per-frame push from a sequence into one of its slots.
    pub fn set_update(&mut self, index: usize, weight: f32, ease_spinner: f32, time: f32) {
        if let Some(slot) = self.slots.get_mut(index).filter(|s| s.occupied()) {
            slot.weight = weight;
            slot.ease_spinner = ease_spinner;
            slot.update_time = Some(time);
            self.mark_dirty();
        }
    }

    /// Mark a contributor as producing no sample this frame.
    pub fn clear_update(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index).filter(|s| s.occupied()) {
            slot.update_time = None;
            self.mark_dirty();
        }
    }

    pub fn set_priority(&mut self, index: usize, priority: u8) {
        if let Some(slot) = self.slots.get_mut(index).filter(|s| s.occupied()) {
            slot.priority = priority;
            self.mark_dirty();
        }
    }

    #[inline]
    pub fn mark_dirty(&mut self) {
        self.needs_recompute = true;
        self.high_sum = UNSET_SUM;
        self.next_high_sum = UNSET_SUM;
        self.high_ease_spinner = UNSET_SUM;
    }

    #[inline]
    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.occupied()).count()
    }

    #[inline]
    pub fn contributor_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.occupied() && !s.additive)
            .count()
    }

    /// Highest priority among the non-additive contributors.
    pub fn highest_priority(&self) -> u8 {
        self.slots
            .iter()
            .filter(|s| s.occupied() && !s.additive)
            .map(|s| s.priority)
            .max()
            .unwrap_or(0)
    }

    pub fn iter_occupied(&self) -> impl Iterator<Item = (usize, &BlendSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.occupied())
    }

    /// Compute normalized weights across the non-additive contributors.
    /// Memoized: a clean array returns immediately.
    pub fn compute_normalized_weights(&mut self) {
        if !self.needs_recompute {
            return;
        }
        self.needs_recompute = false;

        for slot in self.slots.iter_mut().filter(|s| s.occupied() && s.additive) {
            slot.normalized_weight = 0.0;
        }

        let count = self.contributor_count();
        match count {
            0 => return,
            // A lone contributor always carries full weight, whatever
            // its raw weight says.
            1 => {
                for slot in self
                    .slots
                    .iter_mut()
                    .filter(|s| s.occupied() && !s.additive)
                {
                    slot.normalized_weight = 1.0;
                }
                return;
            }
            2 => self.compute_for_two(),
            _ => self.compute_general(),
        }

        if self.weight_threshold > 0.0 {
            self.apply_threshold();
        }
        if self.mode == WeightMode::OnlyHighest {
            self.collapse_to_highest();
        }
    }

    fn compute_for_two(&mut self) {
        let mut pair = [usize::MAX; 2];
        let mut n = 0;
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.occupied() && !slot.additive {
                pair[n] = i;
                n += 1;
            }
        }
        let (a, b) = (pair[0], pair[1]);
        let wa = self.slots[a].weight * self.slots[a].ease_spinner;
        let wb = self.slots[b].weight * self.slots[b].ease_spinner;
        if self.slots[a].priority == self.slots[b].priority {
            let total = wa + wb;
            let inv = if total as f64 > WEIGHT_EPSILON {
                1.0 / total
            } else {
                0.0
            };
            self.slots[a].normalized_weight = wa * inv;
            self.slots[b].normalized_weight = wb * inv;
        } else {
            let (hi, lo, wh, wl) = if self.slots[a].priority > self.slots[b].priority {
                (a, b, wa, wb)
            } else {
                (b, a, wb, wa)
            };
            let hes = self.slots[hi].ease_spinner;
            let total = hes * wh + (1.0 - hes) * wl;
            let inv = if total as f64 > WEIGHT_EPSILON {
                1.0 / total
            } else {
                0.0
            };
            self.slots[hi].normalized_weight = hes * wh * inv;
            self.slots[lo].normalized_weight = (1.0 - hes) * wl * inv;
        }
    }

    fn refresh_band_sums(&mut self) {
        let mut high: Option<u8> = None;
        let mut next: Option<u8> = None;
        for slot in self.slots.iter().filter(|s| s.occupied() && !s.additive) {
            match high {
                None => high = Some(slot.priority),
                Some(h) if slot.priority > h => {
                    next = Some(h);
                    high = Some(slot.priority);
                }
                Some(h) if slot.priority < h => match next {
                    None => next = Some(slot.priority),
                    Some(x) if slot.priority > x => next = Some(slot.priority),
                    _ => {}
                },
                _ => {}
            }
        }
        self.high_priority = high.unwrap_or(0);
        self.next_high_priority = next.unwrap_or(self.high_priority);

        let mut high_sum = 0.0f32;
        let mut next_high_sum = 0.0f32;
        let mut high_ease = 0.0f32;
        for slot in self.slots.iter().filter(|s| s.occupied() && !s.additive) {
            let we = slot.weight * slot.ease_spinner;
            if slot.priority == self.high_priority {
                high_sum += we;
                high_ease = high_ease.max(slot.ease_spinner);
            } else if slot.priority == self.next_high_priority {
                next_high_sum += we;
            }
        }
        if next.is_none() {
            next_high_sum = 0.0;
        }
        self.high_sum = high_sum;
        self.next_high_sum = next_high_sum;
        self.high_ease_spinner = high_ease;
    }

    fn compute_general(&mut self) {
        if self.high_sum == UNSET_SUM {
            self.refresh_band_sums();
        }

        if self.mode == WeightMode::HighPriorityDominant
            && (self.high_sum - 1.0).abs() < HIGH_SUM_EPSILON
        {
            // The high band already carries full weight; normalize
            // within it so the band below cannot bleed through.
            let inv = if self.high_sum as f64 > WEIGHT_EPSILON {
                1.0 / self.high_sum
            } else {
                0.0
            };
            let high = self.high_priority;
            for slot in self.slots.iter_mut().filter(|s| s.occupied() && !s.additive) {
                slot.normalized_weight = if slot.priority == high {
                    slot.weight * slot.ease_spinner * inv
                } else {
                    0.0
                };
            }
            return;
        }

        let hes = self.high_ease_spinner;
        let total = hes * self.high_sum + (1.0 - hes) * self.next_high_sum;
        let inv = if total as f64 > WEIGHT_EPSILON {
            1.0 / total
        } else {
            0.0
        };
        let (high, next) = (self.high_priority, self.next_high_priority);
        for slot in self.slots.iter_mut().filter(|s| s.occupied() && !s.additive) {
            let we = slot.weight * slot.ease_spinner;
            slot.normalized_weight = if slot.priority == high {
                hes * we * inv
            } else if slot.priority == next {
                (1.0 - hes) * we * inv
            } else {
                0.0
            };
        }
    }

    /// Zero out contributors under the threshold and renormalize the
    /// survivors so the sum stays at one.
    fn apply_threshold(&mut self) {
        let mut sum = 0.0f32;
        for slot in self.slots.iter_mut().filter(|s| s.occupied() && !s.additive) {
            if slot.normalized_weight < self.weight_threshold {
                slot.normalized_weight = 0.0;
            }
            sum += slot.normalized_weight;
        }
        if sum as f64 > WEIGHT_EPSILON {
            let inv = 1.0 / sum;
            for slot in self.slots.iter_mut().filter(|s| s.occupied() && !s.additive) {
                slot.normalized_weight *= inv;
            }
        }
    }

    /// Winner-take-all collapse: the largest normalized weight becomes
    /// 1.0 and everything else 0.
    fn collapse_to_highest(&mut self) {
        let mut best: Option<usize> = None;
        let mut best_w = 0.0f32;
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.occupied() && !slot.additive && slot.normalized_weight > best_w {
                best_w = slot.normalized_weight;
                best = Some(i);
            }
        }
        let Some(best) = best else { return };
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.occupied() && !slot.additive {
                slot.normalized_weight = if i == best { 1.0 } else { 0.0 };
            }
        }
    }

    /// Blend the contributors' sampled values into one transform.
    ///
    /// A contributor with an invalid channel drops out of that
    /// channel's weight pool; pools are renormalized per channel so a
    /// rotation-only clip never drags translations toward zero.
    /// Rotations are hemisphere-corrected against the running sum.
    pub fn blend_values(&self, samplers: &[Sampler], scratch: &mut Scratch) -> BoneTransform {
        scratch.begin_blend();
        for slot in self.slots.iter().filter(|s| s.occupied() && !s.additive) {
            if slot.normalized_weight as f64 <= WEIGHT_EPSILON {
                continue;
            }
            let Some(time) = slot.update_time else {
                continue;
            };
            let Some(sampler) = slot.sampler.and_then(|id| samplers.get(id.0 as usize)) else {
                continue;
            };
            let value = sampler.sample(time);
            if value.is_valid() {
                scratch.samples.push((slot.normalized_weight, value));
            }
        }
        blend_samples(&scratch.samples)
    }
}

/// Weighted blend of (weight, value) pairs with per-channel pools.
pub fn blend_samples(samples: &[(f32, BoneTransform)]) -> BoneTransform {
    let mut rot_pool = 0.0f64;
    let mut t_pool = 0.0f64;
    let mut s_pool = 0.0f64;
    for (w, v) in samples {
        let w = *w as f64;
        if v.rotation.is_some() {
            rot_pool += w;
        }
        if v.translation.is_some() {
            t_pool += w;
        }
        if v.scale.is_some() {
            s_pool += w;
        }
    }

    let rotation = if rot_pool > WEIGHT_EPSILON {
        let mut sum = [0.0f64; 4];
        let mut seeded = false;
        for (w, v) in samples {
            let Some(mut q) = v.rotation else { continue };
            if seeded {
                let running: Quat = [sum[0] as f32, sum[1] as f32, sum[2] as f32, sum[3] as f32];
                if quat_dot(running, q) < 0.0 {
                    q = [-q[0], -q[1], -q[2], -q[3]];
                }
            }
            let wn = *w as f64 / rot_pool;
            for i in 0..4 {
                sum[i] += q[i] as f64 * wn;
            }
            seeded = true;
        }
        let len2 = sum.iter().map(|c| c * c).sum::<f64>();
        if len2 > WEIGHT_EPSILON {
            let inv = len2.sqrt().recip();
            Some([
                (sum[0] * inv) as f32,
                (sum[1] * inv) as f32,
                (sum[2] * inv) as f32,
                (sum[3] * inv) as f32,
            ])
        } else {
            None
        }
    } else {
        None
    };

    let translation = if t_pool > WEIGHT_EPSILON {
        let mut sum = [0.0f64; 3];
        for (w, v) in samples {
            if let Some(t) = v.translation {
                for i in 0..3 {
                    sum[i] += t[i] as f64 * *w as f64;
                }
            }
        }
        Some([
            (sum[0] / t_pool) as f32,
            (sum[1] / t_pool) as f32,
            (sum[2] / t_pool) as f32,
        ])
    } else {
        None
    };

    let scale = if s_pool > WEIGHT_EPSILON {
        let mut sum = 0.0f64;
        for (w, v) in samples {
            if let Some(s) = v.scale {
                sum += s as f64 * *w as f64;
            }
        }
        Some((sum / s_pool) as f32)
    } else {
        None
    };

    BoneTransform {
        translation,
        rotation,
        scale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array() -> BlendSlotArray {
        BlendSlotArray::new(&Config::default())
    }

    fn set(arr: &mut BlendSlotArray, i: usize, weight: f32, ease: f32) {
        arr.set_update(i, weight, ease, 0.0);
    }

    #[test]
    fn lone_contributor_gets_full_weight_even_at_zero_raw_weight() {
        let mut arr = array();
        let i = arr.add_slot(SamplerId(0), 0.0, 0.0, 3, false);
        set(&mut arr, i, 0.0, 0.0);
        arr.compute_normalized_weights();
        assert_eq!(arr.slot(i).map(|s| s.normalized_weight), Some(1.0));
    }

    #[test]
    fn equal_priority_pair_normalizes_directly() {
        let mut arr = array();
        let a = arr.add_slot(SamplerId(0), 0.6, 1.0, 2, false);
        let b = arr.add_slot(SamplerId(1), 0.2, 1.0, 2, false);
        set(&mut arr, a, 0.6, 1.0);
        set(&mut arr, b, 0.2, 1.0);
        arr.compute_normalized_weights();
        let nwa = arr.slot(a).map(|s| s.normalized_weight).unwrap();
        let nwb = arr.slot(b).map(|s| s.normalized_weight).unwrap();
        assert!((nwa - 0.75).abs() < 1e-5);
        assert!((nwb - 0.25).abs() < 1e-5);
    }

    #[test]
    fn fully_eased_high_band_shuts_out_lower_band() {
        let mut arr = array();
        let a = arr.add_slot(SamplerId(0), 0.5, 1.0, 5, false);
        let b = arr.add_slot(SamplerId(1), 0.5, 1.0, 5, false);
        let c = arr.add_slot(SamplerId(2), 1.0, 1.0, 2, false);
        set(&mut arr, a, 0.5, 1.0);
        set(&mut arr, b, 0.5, 1.0);
        set(&mut arr, c, 1.0, 1.0);
        arr.compute_normalized_weights();
        assert!((arr.slot(a).unwrap().normalized_weight - 0.5).abs() < 1e-5);
        assert!((arr.slot(b).unwrap().normalized_weight - 0.5).abs() < 1e-5);
        assert_eq!(arr.slot(c).unwrap().normalized_weight, 0.0);
    }

    #[test]
    fn half_eased_high_band_splits_with_lower_band() {
        let mut arr = array();
        let a = arr.add_slot(SamplerId(0), 1.0, 0.5, 5, false);
        let b = arr.add_slot(SamplerId(1), 1.0, 1.0, 2, false);
        let c = arr.add_slot(SamplerId(2), 1.0, 1.0, 2, false);
        set(&mut arr, a, 1.0, 0.5);
        set(&mut arr, b, 1.0, 1.0);
        set(&mut arr, c, 1.0, 1.0);
        arr.compute_normalized_weights();
        let sum: f32 = arr
            .iter_occupied()
            .map(|(_, s)| s.normalized_weight)
            .sum();
        assert!((sum - 1.0).abs() < 1e-5);
        // High band holds hes*w*e/total = 0.5*0.5/1.25 = 0.2.
        assert!((arr.slot(a).unwrap().normalized_weight - 0.2).abs() < 1e-5);
    }

    #[test]
    fn only_highest_collapses_to_winner() {
        let mut arr = BlendSlotArray::new(&Config {
            weight_mode: WeightMode::OnlyHighest,
            ..Config::default()
        });
        let a = arr.add_slot(SamplerId(0), 0.7, 1.0, 2, false);
        let b = arr.add_slot(SamplerId(1), 0.3, 1.0, 2, false);
        let c = arr.add_slot(SamplerId(2), 0.1, 1.0, 2, false);
        set(&mut arr, a, 0.7, 1.0);
        set(&mut arr, b, 0.3, 1.0);
        set(&mut arr, c, 0.1, 1.0);
        arr.compute_normalized_weights();
        assert_eq!(arr.slot(a).unwrap().normalized_weight, 1.0);
        assert_eq!(arr.slot(b).unwrap().normalized_weight, 0.0);
        assert_eq!(arr.slot(c).unwrap().normalized_weight, 0.0);
    }

    #[test]
    fn threshold_zeroes_and_renormalizes() {
        let mut arr = BlendSlotArray::new(&Config {
            weight_threshold: 0.3,
            ..Config::default()
        });
        let a = arr.add_slot(SamplerId(0), 0.8, 1.0, 2, false);
        let b = arr.add_slot(SamplerId(1), 0.1, 1.0, 2, false);
        let c = arr.add_slot(SamplerId(2), 0.1, 1.0, 2, false);
        set(&mut arr, a, 0.8, 1.0);
        set(&mut arr, b, 0.1, 1.0);
        set(&mut arr, c, 0.1, 1.0);
        arr.compute_normalized_weights();
        assert_eq!(arr.slot(a).unwrap().normalized_weight, 1.0);
        assert_eq!(arr.slot(b).unwrap().normalized_weight, 0.0);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut arr = array();
        let a = arr.add_slot(SamplerId(0), 1.0, 1.0, 1, false);
        let _b = arr.add_slot(SamplerId(1), 1.0, 1.0, 1, false);
        arr.remove_slot(a);
        let c = arr.add_slot(SamplerId(2), 1.0, 1.0, 1, false);
        assert_eq!(c, a);
    }

    #[test]
    fn additive_slots_never_enter_normalization() {
        let mut arr = array();
        let a = arr.add_slot(SamplerId(0), 1.0, 1.0, 2, false);
        let add = arr.add_slot(SamplerId(1), 1.0, 1.0, 9, true);
        set(&mut arr, a, 1.0, 1.0);
        set(&mut arr, add, 1.0, 1.0);
        arr.compute_normalized_weights();
        assert_eq!(arr.slot(a).unwrap().normalized_weight, 1.0);
        assert_eq!(arr.slot(add).unwrap().normalized_weight, 0.0);
    }

    #[test]
    fn degenerate_total_blends_to_all_zero() {
        let mut arr = array();
        let a = arr.add_slot(SamplerId(0), 0.0, 0.0, 2, false);
        let b = arr.add_slot(SamplerId(1), 0.0, 0.0, 2, false);
        set(&mut arr, a, 0.0, 0.0);
        set(&mut arr, b, 0.0, 0.0);
        arr.compute_normalized_weights();
        assert_eq!(arr.slot(a).unwrap().normalized_weight, 0.0);
        assert_eq!(arr.slot(b).unwrap().normalized_weight, 0.0);
    }

    #[test]
    fn invalid_rotation_contributor_leaves_pool() {
        let q = crate::transform::QUAT_IDENTITY;
        let samples = [
            (
                0.5,
                BoneTransform {
                    translation: Some([2.0, 0.0, 0.0]),
                    rotation: None,
                    scale: None,
                },
            ),
            (
                0.5,
                BoneTransform {
                    translation: Some([0.0, 0.0, 0.0]),
                    rotation: Some(q),
                    scale: None,
                },
            ),
        ];
        let out = blend_samples(&samples);
        // Rotation pool holds only the second contributor at full weight.
        assert_eq!(out.rotation, Some(q));
        assert_eq!(out.translation, Some([1.0, 0.0, 0.0]));
        assert_eq!(out.scale, None);
    }

    #[test]
    fn opposite_hemisphere_rotations_do_not_cancel() {
        let q = crate::transform::quat_normalize([0.0, 0.3, 0.0, 0.95]);
        let neg = [-q[0], -q[1], -q[2], -q[3]];
        let out = blend_samples(&[
            (0.5, BoneTransform::pose([0.0; 3], q, 1.0)),
            (0.5, BoneTransform::pose([0.0; 3], neg, 1.0)),
        ]);
        let r = out.rotation.unwrap();
        assert!(quat_dot(r, q).abs() > 0.9999);
    }
}
