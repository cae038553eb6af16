//! Keyed-channel evaluation for the canonical ClipData schema.
//!
//! Model:
//! - Each channel is an ordered list of keys with times in seconds.
//! - `Step` holds the left key; `Linear` interpolates (nlerp with
//!   shortest-arc correction for rotations).
//! - Sampling clamps at the channel ends; an empty channel samples to
//!   `None` (invalid for that component).

use crate::data::{ChannelData, FloatKey, KeyInterp, QuatKey, Vec3Key};
use crate::transform::{lerp, lerp_vec3, nlerp_quat, BoneTransform, Quat, Vec3};

/// Find the segment [i, i+1] containing `t` and the local fraction
/// within it. Edge cases:
/// - `t <= first.time` returns (0, 0, 0) and the caller picks key 0.
/// - `t >= last.time` returns (last, last, 0) and the caller picks the
///   last key.
fn find_segment<K>(keys: &[K], time_of: impl Fn(&K) -> f32, t: f32) -> (usize, usize, f32) {
    let n = keys.len();
    if n == 0 {
        return (0, 0, 0.0);
    }
    if n == 1 || t <= time_of(&keys[0]) {
        return (0, 0, 0.0);
    }
    if t >= time_of(&keys[n - 1]) {
        return (n - 1, n - 1, 0.0);
    }
    // Binary search for the last key at or before t.
    let i = keys.partition_point(|k| time_of(k) <= t).saturating_sub(1);
    let i = i.min(n - 2);
    let t0 = time_of(&keys[i]);
    let t1 = time_of(&keys[i + 1]);
    let denom = (t1 - t0).max(f32::EPSILON);
    let lt = ((t - t0) / denom).clamp(0.0, 1.0);
    (i, i + 1, lt)
}

pub fn sample_vec3(keys: &[Vec3Key], t: f32, interp: KeyInterp) -> Option<Vec3> {
    if keys.is_empty() {
        return None;
    }
    let (i0, i1, lt) = find_segment(keys, |k| k.time, t);
    if i0 == i1 {
        return Some(keys[i0].value);
    }
    match interp {
        KeyInterp::Step => Some(keys[i0].value),
        KeyInterp::Linear => Some(lerp_vec3(keys[i0].value, keys[i1].value, lt)),
    }
}

pub fn sample_quat(keys: &[QuatKey], t: f32, interp: KeyInterp) -> Option<Quat> {
    if keys.is_empty() {
        return None;
    }
    let (i0, i1, lt) = find_segment(keys, |k| k.time, t);
    if i0 == i1 {
        return Some(keys[i0].value);
    }
    match interp {
        KeyInterp::Step => Some(keys[i0].value),
        KeyInterp::Linear => Some(nlerp_quat(keys[i0].value, keys[i1].value, lt)),
    }
}

pub fn sample_float(keys: &[FloatKey], t: f32, interp: KeyInterp) -> Option<f32> {
    if keys.is_empty() {
        return None;
    }
    let (i0, i1, lt) = find_segment(keys, |k| k.time, t);
    if i0 == i1 {
        return Some(keys[i0].value);
    }
    match interp {
        KeyInterp::Step => Some(keys[i0].value),
        KeyInterp::Linear => Some(lerp(keys[i0].value, keys[i1].value, lt)),
    }
}

/// Sample all channels of a block at local time `t`.
pub fn sample_channels(channels: &ChannelData, t: f32) -> BoneTransform {
    BoneTransform {
        translation: sample_vec3(&channels.translation, t, channels.interp),
        rotation: sample_quat(&channels.rotation, t, channels.interp),
        scale: sample_float(&channels.scale, t, channels.interp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys3(ts: &[(f32, Vec3)]) -> Vec<Vec3Key> {
        ts.iter()
            .map(|&(time, value)| Vec3Key { time, value })
            .collect()
    }

    #[test]
    fn empty_channel_is_invalid() {
        assert_eq!(sample_vec3(&[], 0.5, KeyInterp::Linear), None);
    }

    #[test]
    fn clamps_at_ends() {
        let keys = keys3(&[(0.0, [0.0; 3]), (1.0, [2.0, 0.0, 0.0])]);
        assert_eq!(sample_vec3(&keys, -5.0, KeyInterp::Linear), Some([0.0; 3]));
        assert_eq!(
            sample_vec3(&keys, 9.0, KeyInterp::Linear),
            Some([2.0, 0.0, 0.0])
        );
    }

    #[test]
    fn linear_midpoint() {
        let keys = keys3(&[(0.0, [0.0; 3]), (2.0, [4.0, 0.0, 0.0])]);
        assert_eq!(
            sample_vec3(&keys, 1.0, KeyInterp::Linear),
            Some([2.0, 0.0, 0.0])
        );
    }

    #[test]
    fn step_holds_left_key() {
        let keys = keys3(&[(0.0, [0.0; 3]), (2.0, [4.0, 0.0, 0.0])]);
        assert_eq!(sample_vec3(&keys, 1.9, KeyInterp::Step), Some([0.0; 3]));
    }
}
