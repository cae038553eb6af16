//! StoredClip JSON parsing.
//!
//! Public API: parse stored-clip JSON into the canonical ClipData
//! (data.rs). The wire schema is friendlier than the canonical one:
//! keys are written as `{ "time": t, "value": ... }` objects with
//! vector values as `{x,y,z}` and quaternions as `{x,y,z,w}`, and all
//! numbers arrive as f64.

use serde::Deserialize;

use crate::data::{
    BlockData, ChannelData, ClipData, CycleType, FloatKey, KeyInterp, QuatKey, Vec3Key,
};
use crate::error::BlendError;

/// Parse stored-clip JSON into canonical ClipData and validate it.
pub fn parse_stored_clip_json(s: &str) -> Result<ClipData, BlendError> {
    let sc: StoredClip =
        serde_json::from_str(s).map_err(|e| BlendError::InvalidClip(format!("parse error: {e}")))?;

    let mut blocks: Vec<BlockData> = Vec::with_capacity(sc.blocks.len());
    for sb in sc.blocks {
        let interp = match sb.interp.as_deref() {
            None | Some("linear") => KeyInterp::Linear,
            Some("step") => KeyInterp::Step,
            Some(other) => {
                return Err(BlendError::InvalidClip(format!(
                    "unknown interpolation '{other}' for '{}'",
                    sb.target
                )))
            }
        };
        blocks.push(BlockData {
            target: sb.target,
            channels: ChannelData {
                translation: sb
                    .translation
                    .into_iter()
                    .map(|k| Vec3Key {
                        time: k.time as f32,
                        value: [k.value.x as f32, k.value.y as f32, k.value.z as f32],
                    })
                    .collect(),
                rotation: sb
                    .rotation
                    .into_iter()
                    .map(|k| QuatKey {
                        time: k.time as f32,
                        value: [
                            k.value.x as f32,
                            k.value.y as f32,
                            k.value.z as f32,
                            k.value.w as f32,
                        ],
                    })
                    .collect(),
                scale: sb
                    .scale
                    .into_iter()
                    .map(|k| FloatKey {
                        time: k.time as f32,
                        value: k.value as f32,
                    })
                    .collect(),
                interp,
            },
            priority: sb.priority,
        });
    }

    let cycle = match sc.cycle.as_deref() {
        None | Some("loop") => CycleType::Loop,
        Some("clamp") => CycleType::Clamp,
        Some(other) => {
            return Err(BlendError::InvalidClip(format!("unknown cycle '{other}'")))
        }
    };

    let clip = ClipData {
        name: sc.name,
        blocks,
        duration: sc.duration as f32,
        cycle,
        frequency: sc.frequency.unwrap_or(1.0) as f32,
        additive_reference_time: sc.additive_reference_time.map(|t| t as f32),
    };
    clip.validate_basic().map_err(BlendError::InvalidClip)?;
    Ok(clip)
}

// ----- JSON schema (serde) -----

#[derive(Debug, Deserialize)]
struct StoredClip {
    pub name: String,
    pub blocks: Vec<ScBlock>,
    /// Seconds.
    pub duration: f64,
    #[serde(default)]
    pub cycle: Option<String>,
    #[serde(default)]
    pub frequency: Option<f64>,
    #[serde(default)]
    #[serde(rename = "additiveReferenceTime")]
    pub additive_reference_time: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ScBlock {
    pub target: String,
    #[serde(default)]
    pub translation: Vec<ScKey<ScVec3>>,
    #[serde(default)]
    pub rotation: Vec<ScKey<ScQuat>>,
    #[serde(default)]
    pub scale: Vec<ScKey<f64>>,
    #[serde(default)]
    pub interp: Option<String>,
    #[serde(default)]
    pub priority: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct ScKey<V> {
    pub time: f64,
    pub value: V,
}

#[derive(Debug, Deserialize)]
struct ScVec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Deserialize)]
struct ScQuat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}
