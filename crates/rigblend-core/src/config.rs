//! Core configuration for rigblend-core.

use serde::{Deserialize, Serialize};

/// How normalized weights are computed inside a blend slot array.
/// The variants are mutually exclusive by construction.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightMode {
    /// Two-priority-band blend driven by the high band's ease spinner.
    #[default]
    Standard,
    /// Like Standard, but when the high band's weight sum is within
    /// epsilon of 1.0, normalize within the high band alone so a fully
    /// eased-in layer is not contaminated by the band below it.
    HighPriorityDominant,
    /// Winner-take-all: the slot with the largest normalized weight
    /// gets 1.0, everything else 0.
    OnlyHighest,
}

/// Engine-wide tuning knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Normalized weights below this are clamped to zero, with the
    /// survivors renormalized. 0.0 disables the pass.
    pub weight_threshold: f32,

    /// Weight normalization variant.
    pub weight_mode: WeightMode,

    /// Enable the smoothing side-table (exponential weight smoothing,
    /// graceful fade-out of detached contributors).
    pub blend_smoothing: bool,

    /// Half-life parameter of the exponential smoothing, in seconds:
    /// rate = 1 - exp(-dt / half_life).
    pub smoothing_half_life: f32,

    /// Smoothed weights below this snap to exactly 0 while a
    /// contributor is deactivating.
    pub min_smoothed_weight: f32,

    /// Smoothed weights above this snap to exactly 1 while a
    /// contributor is activating.
    pub full_weight_snap: f32,

    /// Inject a stationary pose contributor so a lone fading clip
    /// blends against its last known pose instead of nothing.
    pub pose_samplers: bool,

    /// Capacity hint for per-target slot arrays.
    pub slot_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            weight_threshold: 0.0,
            weight_mode: WeightMode::Standard,
            blend_smoothing: true,
            smoothing_half_life: 0.05,
            min_smoothed_weight: 0.001,
            full_weight_snap: 0.999,
            pose_samplers: true,
            slot_capacity: 8,
        }
    }
}
