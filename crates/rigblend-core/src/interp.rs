//! Sampler variants.
//!
//! Every contributor to a blend is a sampler: either a keyframe
//! sampler over a block's channels, or a stationary pose sampler
//! holding a captured transform. The tagged enum replaces any need for
//! dynamic dispatch at the blend site.

use serde::{Deserialize, Serialize};

use crate::data::ChannelData;
use crate::sampling::sample_channels;
use crate::transform::BoneTransform;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Sampler {
    /// Evaluates keyed channels at warped clip time.
    Keyframe { channels: ChannelData },
    /// Holds a fixed transform; used to give a lone fading contributor
    /// something to blend against.
    Pose { transform: BoneTransform },
}

impl Sampler {
    pub fn keyframe(channels: ChannelData) -> Self {
        Sampler::Keyframe { channels }
    }

    pub fn pose(transform: BoneTransform) -> Self {
        Sampler::Pose { transform }
    }

    /// Evaluate at local time `t`. Pose samplers ignore time.
    #[inline]
    pub fn sample(&self, t: f32) -> BoneTransform {
        match self {
            Sampler::Keyframe { channels } => sample_channels(channels, t),
            Sampler::Pose { transform } => *transform,
        }
    }

    #[inline]
    pub fn is_pose(&self) -> bool {
        matches!(self, Sampler::Pose { .. })
    }

    /// Re-capture the held transform of a pose sampler. No-op on a
    /// keyframe sampler.
    pub fn refresh_pose(&mut self, current: BoneTransform) {
        if let Sampler::Pose { transform } = self {
            *transform = current;
        }
    }
}
