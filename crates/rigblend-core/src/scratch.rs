//! Per-update scratch buffers.
//!
//! Owned by the engine and threaded explicitly through the blend math
//! so steady-state updates allocate nothing.

use crate::config::Config;
use crate::transform::BoneTransform;

#[derive(Debug, Default)]
pub struct Scratch {
    /// (normalized weight, sampled value) pairs for the current target.
    pub samples: Vec<(f32, BoneTransform)>,
}

impl Scratch {
    pub fn new(cfg: &Config) -> Self {
        Self {
            samples: Vec::with_capacity(cfg.slot_capacity),
        }
    }

    #[inline]
    pub fn begin_blend(&mut self) {
        self.samples.clear();
    }
}
