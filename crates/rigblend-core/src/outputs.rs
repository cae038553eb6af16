//! Per-update outputs: blended transforms plus semantic events.

use serde::{Deserialize, Serialize};

use crate::ids::{SamplerId, SequenceId, TargetId};
use crate::transform::BoneTransform;

/// One target's blended local transform for this update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub target: TargetId,
    pub name: String,
    pub transform: BoneTransform,
}

/// Lifecycle notifications consumed by game-rule code.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CoreEvent {
    SequenceActivated {
        sequence: SequenceId,
    },
    /// Emitted once the sequence reaches Inactive, not when easing out
    /// begins.
    SequenceDeactivated {
        sequence: SequenceId,
    },
    ContributorAttached {
        target: TargetId,
        sampler: SamplerId,
    },
    /// The contributor's blend slot was physically removed, either
    /// immediately on detach or after its smoothed weight faded out.
    ContributorDetached {
        target: TargetId,
        sampler: SamplerId,
    },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Outputs {
    pub changes: Vec<Change>,
    pub events: Vec<CoreEvent>,
}

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.changes.clear();
        self.events.clear();
    }

    #[inline]
    pub fn push_change(&mut self, change: Change) {
        self.changes.push(change);
    }

    #[inline]
    pub fn push_event(&mut self, event: CoreEvent) {
        self.events.push(event);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.events.is_empty()
    }
}
