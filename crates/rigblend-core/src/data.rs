//! Canonical clip data model (ClipData).
//!
//! A clip is a named set of controlled blocks; each block targets one
//! bone by name and carries a keyed channel per transform component.
//! Wire parsing and schema-level validation live in stored_clip.rs.

use serde::{Deserialize, Serialize};

use crate::transform::{Quat, Vec3};

/// Interpolation kind for a keyed channel.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyInterp {
    Step,
    #[default]
    Linear,
}

/// What happens when warped time runs past the clip bounds.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleType {
    #[default]
    Loop,
    Clamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec3Key {
    pub time: f32,
    pub value: Vec3,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuatKey {
    pub time: f32,
    pub value: Quat,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FloatKey {
    pub time: f32,
    pub value: f32,
}

/// One bone's keyed channels. Any channel may be empty, in which case
/// that component samples as invalid and is excluded from blending.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelData {
    #[serde(default)]
    pub translation: Vec<Vec3Key>,
    #[serde(default)]
    pub rotation: Vec<QuatKey>,
    #[serde(default)]
    pub scale: Vec<FloatKey>,
    #[serde(default)]
    pub interp: KeyInterp,
}

/// A clip's handle on one target bone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockData {
    /// Target bone name, resolved against the engine's targets lazily.
    pub target: String,
    pub channels: ChannelData,
    /// Per-block blend priority. `None` means the block inherits the
    /// priority passed at activation time.
    #[serde(default)]
    pub priority: Option<u8>,
}

/// Canonical clip format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipData {
    pub name: String,
    pub blocks: Vec<BlockData>,
    /// Clip length in seconds (local, unwarped time).
    pub duration: f32,
    #[serde(default)]
    pub cycle: CycleType,
    /// Playback rate multiplier applied to warped time.
    #[serde(default = "default_frequency")]
    pub frequency: f32,
    /// When set, the clip blends as an additive layer against the pose
    /// it samples at this local time.
    #[serde(default)]
    pub additive_reference_time: Option<f32>,
}

fn default_frequency() -> f32 {
    1.0
}

impl ClipData {
    /// Validate basic invariants (finite positive duration, monotonic
    /// non-decreasing key times, at least one block).
    pub fn validate_basic(&self) -> Result<(), String> {
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err("ClipData.duration must be finite and > 0".into());
        }
        if !self.frequency.is_finite() || self.frequency <= 0.0 {
            return Err("ClipData.frequency must be finite and > 0".into());
        }
        if self.blocks.is_empty() {
            return Err("ClipData must control at least one block".into());
        }
        for block in &self.blocks {
            if block.target.is_empty() {
                return Err("BlockData.target must not be empty".into());
            }
            check_monotonic(
                block.channels.translation.iter().map(|k| k.time),
                &block.target,
            )?;
            check_monotonic(block.channels.rotation.iter().map(|k| k.time), &block.target)?;
            check_monotonic(block.channels.scale.iter().map(|k| k.time), &block.target)?;
        }
        if let Some(t) = self.additive_reference_time {
            if !t.is_finite() || t < 0.0 {
                return Err("ClipData.additive_reference_time must be finite and >= 0".into());
            }
        }
        Ok(())
    }
}

fn check_monotonic(times: impl Iterator<Item = f32>, target: &str) -> Result<(), String> {
    let mut last = -f32::INFINITY;
    for t in times {
        if !t.is_finite() || t < 0.0 {
            return Err(format!("Key times must be finite and >= 0 for '{target}'"));
        }
        if t < last {
            return Err(format!("Key times must be non-decreasing for '{target}'"));
        }
        last = t;
    }
    Ok(())
}
