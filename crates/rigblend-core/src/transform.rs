//! Channel-optional bone transform plus the quaternion helpers the
//! blending math needs.
//!
//! A channel may be individually absent ("invalid"): a rotation-only
//! clip samples to a transform with `translation == None`. Quaternions
//! are `[x, y, z, w]`.

use serde::{Deserialize, Serialize};

pub type Vec3 = [f32; 3];
pub type Quat = [f32; 4];

pub const QUAT_IDENTITY: Quat = [0.0, 0.0, 0.0, 1.0];

/// One bone's local transform with per-channel validity.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoneTransform {
    pub translation: Option<Vec3>,
    pub rotation: Option<Quat>,
    pub scale: Option<f32>,
}

impl BoneTransform {
    /// A transform with every channel invalid.
    pub const INVALID: BoneTransform = BoneTransform {
        translation: None,
        rotation: None,
        scale: None,
    };

    /// A fully valid pose.
    pub fn pose(translation: Vec3, rotation: Quat, scale: f32) -> Self {
        Self {
            translation: Some(translation),
            rotation: Some(rotation),
            scale: Some(scale),
        }
    }

    /// The identity pose.
    pub fn identity() -> Self {
        Self::pose([0.0; 3], QUAT_IDENTITY, 1.0)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.translation.is_some() || self.rotation.is_some() || self.scale.is_some()
    }

    #[inline]
    pub fn is_invalid(&self) -> bool {
        !self.is_valid()
    }

    /// Fill any invalid channel from `other` (used to fall back to the
    /// rest pose after blending).
    pub fn or_else_from(mut self, other: &BoneTransform) -> Self {
        if self.translation.is_none() {
            self.translation = other.translation;
        }
        if self.rotation.is_none() {
            self.rotation = other.rotation;
        }
        if self.scale.is_none() {
            self.scale = other.scale;
        }
        self
    }
}

#[inline]
pub fn quat_dot(a: Quat, b: Quat) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + a[3] * b[3]
}

#[inline]
pub fn quat_negate(q: Quat) -> Quat {
    [-q[0], -q[1], -q[2], -q[3]]
}

#[inline]
pub fn quat_normalize(q: Quat) -> Quat {
    let len2 = quat_dot(q, q);
    if len2 > 0.0 {
        let inv = len2.sqrt().recip();
        [q[0] * inv, q[1] * inv, q[2] * inv, q[3] * inv]
    } else {
        QUAT_IDENTITY
    }
}

/// Hamilton product a * b.
#[inline]
pub fn quat_mul(a: Quat, b: Quat) -> Quat {
    let [ax, ay, az, aw] = a;
    let [bx, by, bz, bw] = b;
    [
        aw * bx + ax * bw + ay * bz - az * by,
        aw * by - ax * bz + ay * bw + az * bx,
        aw * bz + ax * by - ay * bx + az * bw,
        aw * bw - ax * bx - ay * by - az * bz,
    ]
}

/// Conjugate; the inverse for unit quaternions.
#[inline]
pub fn quat_conjugate(q: Quat) -> Quat {
    [-q[0], -q[1], -q[2], q[3]]
}

#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[inline]
pub fn lerp_vec3(a: Vec3, b: Vec3, t: f32) -> Vec3 {
    [lerp(a[0], b[0], t), lerp(a[1], b[1], t), lerp(a[2], b[2], t)]
}

/// Quaternion NLERP with shortest-arc correction: if the dot is
/// negative, negate the second quaternion before lerping, then
/// renormalize.
#[inline]
pub fn nlerp_quat(a: Quat, mut b: Quat, t: f32) -> Quat {
    if quat_dot(a, b) < 0.0 {
        b = quat_negate(b);
    }
    quat_normalize([
        lerp(a[0], b[0], t),
        lerp(a[1], b[1], t),
        lerp(a[2], b[2], t),
        lerp(a[3], b[3], t),
    ])
}
