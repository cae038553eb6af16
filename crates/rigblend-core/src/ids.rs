//! Opaque handles for engine-owned entities.
//!
//! A handle is equality-comparable identity: the same `SamplerId` names
//! the same contributor wherever it appears, in blend slots, smoothing
//! entries, and controlled blocks alike. Values are dense u32 indices
//! into the engine's arenas, but callers treat them as opaque.

use serde::{Deserialize, Serialize};

/// A blendable bone/node registered with the engine.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TargetId(pub u32);

/// A keyframe or pose sampler.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SamplerId(pub u32);

/// A loaded clip playing (or parked) as a sequence.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SequenceId(pub u32);

/// Hands out the next dense index per entity kind.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_target: u32,
    next_sampler: u32,
    next_sequence: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_target(&mut self) -> TargetId {
        let id = TargetId(self.next_target);
        self.next_target = self.next_target.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_sampler(&mut self) -> SamplerId {
        let id = SamplerId(self.next_sampler);
        self.next_sampler = self.next_sampler.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_sequence(&mut self) -> SequenceId {
        let id = SequenceId(self.next_sequence);
        self.next_sequence = self.next_sequence.wrapping_add(1);
        id
    }
}
