//! Additive layer metadata and delta composition.
//!
//! An additive sequence does not join the priority bands. Each update
//! its samplers are evaluated normally, the captured reference pose is
//! subtracted, and the remaining delta is composed onto the blended
//! base, scaled by a smoothed per-contributor weight multiplier.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::ids::SamplerId;
use crate::transform::{
    nlerp_quat, quat_conjugate, quat_mul, quat_normalize, BoneTransform, QUAT_IDENTITY,
};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AdditiveMetadata {
    /// Clip-local time the reference pose was sampled at.
    pub reference_time: f32,
    /// When set (the default), the layer applies regardless of what
    /// else is blending. When cleared, the layer only composes while
    /// its own priority matches the target's highest band.
    pub ignore_priorities: bool,
    /// Reference pose per sampler, captured at init.
    pub reference: HashMap<SamplerId, BoneTransform>,
}

impl AdditiveMetadata {
    pub fn new(reference_time: f32, ignore_priorities: bool) -> Self {
        Self {
            reference_time,
            ignore_priorities,
            reference: HashMap::new(),
        }
    }

    /// Subtract the captured reference from a sampled value. Channels
    /// missing on either side produce no delta.
    pub fn delta(&self, sampler: SamplerId, sampled: &BoneTransform) -> BoneTransform {
        let Some(reference) = self.reference.get(&sampler) else {
            return BoneTransform::INVALID;
        };
        BoneTransform {
            translation: match (sampled.translation, reference.translation) {
                (Some(cur), Some(r)) => Some([cur[0] - r[0], cur[1] - r[1], cur[2] - r[2]]),
                _ => None,
            },
            rotation: match (sampled.rotation, reference.rotation) {
                (Some(cur), Some(r)) => Some(quat_normalize(quat_mul(cur, quat_conjugate(r)))),
                _ => None,
            },
            scale: match (sampled.scale, reference.scale) {
                (Some(cur), Some(r)) => Some(cur - r),
                _ => None,
            },
        }
    }
}

/// Compose a weighted delta onto the blended base. The rotation delta
/// is eased toward identity by the weight before being applied, so a
/// half-weight layer rotates halfway.
pub fn apply_delta(base: &mut BoneTransform, delta: &BoneTransform, weight: f32) {
    if weight <= 0.0 {
        return;
    }
    if let (Some(b), Some(d)) = (base.translation, delta.translation) {
        base.translation = Some([
            b[0] + d[0] * weight,
            b[1] + d[1] * weight,
            b[2] + d[2] * weight,
        ]);
    }
    if let (Some(b), Some(d)) = (base.rotation, delta.rotation) {
        let scaled = nlerp_quat(QUAT_IDENTITY, d, weight.clamp(0.0, 1.0));
        base.rotation = Some(quat_normalize(quat_mul(scaled, b)));
    }
    if let (Some(b), Some(d)) = (base.scale, delta.scale) {
        base.scale = Some(b + d * weight);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::quat_dot;

    #[test]
    fn delta_of_the_reference_pose_is_neutral() {
        let mut meta = AdditiveMetadata::new(0.0, false);
        let pose = BoneTransform::pose([1.0, 2.0, 3.0], QUAT_IDENTITY, 1.5);
        meta.reference.insert(SamplerId(0), pose);

        let d = meta.delta(SamplerId(0), &pose);
        assert_eq!(d.translation, Some([0.0; 3]));
        assert_eq!(d.scale, Some(0.0));
        assert!(quat_dot(d.rotation.unwrap(), QUAT_IDENTITY).abs() > 0.9999);

        let mut base = BoneTransform::identity();
        let before = base;
        apply_delta(&mut base, &d, 1.0);
        assert_eq!(base.translation, before.translation);
        assert_eq!(base.scale, before.scale);
        assert!(quat_dot(base.rotation.unwrap(), before.rotation.unwrap()).abs() > 0.9999);
    }

    #[test]
    fn zero_weight_is_a_no_op() {
        let mut meta = AdditiveMetadata::new(0.0, false);
        meta.reference
            .insert(SamplerId(0), BoneTransform::identity());
        let d = meta.delta(
            SamplerId(0),
            &BoneTransform::pose([5.0, 0.0, 0.0], QUAT_IDENTITY, 2.0),
        );
        let mut base = BoneTransform::identity();
        apply_delta(&mut base, &d, 0.0);
        assert_eq!(base, BoneTransform::identity());
    }

    #[test]
    fn translation_delta_scales_with_weight() {
        let mut meta = AdditiveMetadata::new(0.0, false);
        meta.reference
            .insert(SamplerId(0), BoneTransform::identity());
        let d = meta.delta(
            SamplerId(0),
            &BoneTransform::pose([4.0, 0.0, 0.0], QUAT_IDENTITY, 1.0),
        );
        let mut base = BoneTransform::identity();
        apply_delta(&mut base, &d, 0.5);
        assert_eq!(base.translation, Some([2.0, 0.0, 0.0]));
    }

    #[test]
    fn missing_reference_channel_produces_no_delta() {
        let mut meta = AdditiveMetadata::new(0.0, false);
        meta.reference.insert(
            SamplerId(0),
            BoneTransform {
                translation: Some([0.0; 3]),
                rotation: None,
                scale: None,
            },
        );
        let d = meta.delta(
            SamplerId(0),
            &BoneTransform::pose([1.0, 0.0, 0.0], QUAT_IDENTITY, 1.0),
        );
        assert_eq!(d.rotation, None);
        assert_eq!(d.scale, None);
        assert_eq!(d.translation, Some([1.0, 0.0, 0.0]));
    }
}
