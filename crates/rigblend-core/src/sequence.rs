//! Sequence lifecycle: state machine, spinner math, and warped-time
//! bookkeeping.
//!
//! A sequence is one playing clip. It holds the controlled blocks that
//! tie it to targets but none of the blend state; attach and detach of
//! blend slots are driven by the engine, which owns both sides.
//!
//! Time sentinels use `UNSET_TIME`: an unset offset or start time is
//! captured lazily on the first update after (re)activation.

use serde::{Deserialize, Serialize};

use crate::additive::AdditiveMetadata;
use crate::data::CycleType;
use crate::error::BlendError;
use crate::ids::{SamplerId, SequenceId, TargetId};

/// Sentinel for "not observed yet" times.
pub const UNSET_TIME: f32 = f32::NEG_INFINITY;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceState {
    #[default]
    Inactive,
    /// Weight ramping up after a plain activation.
    EaseIn,
    Animating,
    /// Weight ramping down toward deactivation.
    EaseOut,
    /// Outgoing half of a transition pair.
    TransSource,
    /// Incoming half of a transition pair; may hold a destination
    /// frame to jump to when the transition completes.
    TransDest,
    /// One-shot state: computes the partner's corresponding start
    /// frame, then falls through to TransSource within the same update.
    MorphSource,
}

/// A sequence's handle on one target bone.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ControlledBlock {
    pub target_name: String,
    /// Resolved lazily; a miss is recoverable and retried next update.
    pub target: Option<TargetId>,
    pub sampler: SamplerId,
    /// Block priority; `None` inherits the activation priority.
    pub priority: Option<u8>,
    /// Index into the target's blend slot array while attached.
    pub blend_slot: Option<usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sequence {
    pub name: String,
    pub state: SequenceState,
    /// Maps global time to clip-local time: local = (offset + t) * freq.
    pub offset: f32,
    /// Ease window in global time. Before the first update after a
    /// state change, `end_time` holds the ease duration instead.
    pub start_time: f32,
    pub end_time: f32,
    /// Global time of the last update.
    pub last_time: f32,
    /// Clip-local time of the last update, after cycle wrapping.
    pub weighted_last_time: f32,
    pub frequency: f32,
    pub duration: f32,
    pub cycle: CycleType,
    pub weight: f32,
    pub activation_priority: u8,
    pub ease_spinner: f32,
    pub trans_spinner: f32,
    /// Local frame to jump to when a TransDest transition completes.
    pub dest_frame: Option<f32>,
    /// Time-sync partner; this sequence samples at the partner's
    /// corresponding frame while set.
    pub partner: Option<SequenceId>,
    pub blocks: Vec<ControlledBlock>,
    pub additive: Option<AdditiveMetadata>,
}

/// What `advance_spinners` observed this update.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SpinnerOutcome {
    Active,
    BecameAnimating,
    /// The ease-out or trans-source window ran out; the caller must
    /// deactivate with zero ease.
    FinishedEaseOut,
}

impl Sequence {
    pub fn new(name: String, duration: f32, frequency: f32, cycle: CycleType) -> Self {
        Self {
            name,
            state: SequenceState::Inactive,
            offset: UNSET_TIME,
            start_time: UNSET_TIME,
            end_time: 0.0,
            last_time: UNSET_TIME,
            weighted_last_time: 0.0,
            frequency,
            duration,
            cycle,
            weight: 1.0,
            activation_priority: 0,
            ease_spinner: 0.0,
            trans_spinner: 1.0,
            dest_frame: None,
            partner: None,
            blocks: Vec::new(),
            additive: None,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state != SequenceState::Inactive
    }

    #[inline]
    pub fn is_easing_out(&self) -> bool {
        matches!(
            self.state,
            SequenceState::EaseOut | SequenceState::TransSource
        )
    }

    /// State and time bookkeeping for activation. The caller has
    /// already verified the sequence is inactive and attached slots.
    pub fn begin_activation(
        &mut self,
        priority: u8,
        weight: f32,
        ease_in: f32,
        transition: bool,
        start_over: bool,
    ) {
        self.activation_priority = priority;
        self.weight = weight;
        if start_over {
            self.offset = UNSET_TIME;
            self.dest_frame = None;
        }
        self.last_time = UNSET_TIME;
        self.start_time = UNSET_TIME;
        if ease_in > 0.0 {
            self.end_time = ease_in;
            self.ease_spinner = if transition { 1.0 } else { 0.0 };
            self.trans_spinner = if transition { 0.0 } else { 1.0 };
            self.state = if transition {
                SequenceState::TransDest
            } else {
                SequenceState::EaseIn
            };
        } else {
            self.ease_spinner = 1.0;
            self.trans_spinner = 1.0;
            self.state = SequenceState::Animating;
        }
    }

    /// State and time bookkeeping for deactivation. With zero ease the
    /// sequence stops immediately and folds the current local time into
    /// the offset so a later `start_over: false` activation resumes
    /// where it left off. Returns whether the stop is immediate.
    pub fn begin_deactivation(&mut self, ease_out: f32, transition: bool) -> bool {
        if ease_out > 0.0 {
            self.start_time = UNSET_TIME;
            self.end_time = ease_out;
            self.state = if transition {
                SequenceState::TransSource
            } else {
                SequenceState::EaseOut
            };
            false
        } else {
            if self.last_time != UNSET_TIME && self.frequency > 0.0 {
                self.offset = self.weighted_last_time / self.frequency - self.last_time;
            }
            self.state = SequenceState::Inactive;
            self.partner = None;
            self.dest_frame = None;
            true
        }
    }

    /// Advance the ease/transition spinners for an update at global
    /// `time`, lazily capturing offset and the ease window.
    pub fn advance_spinners(&mut self, time: f32) -> SpinnerOutcome {
        if self.offset == UNSET_TIME {
            self.offset = -time;
        }
        if self.start_time == UNSET_TIME {
            self.start_time = time;
            self.end_time = time + self.end_time;
        }
        let window = (self.end_time - self.start_time).max(f32::EPSILON);
        match self.state {
            SequenceState::EaseIn => {
                if time < self.end_time {
                    self.ease_spinner = ((time - self.start_time) / window).clamp(0.0, 1.0);
                } else {
                    self.ease_spinner = 1.0;
                    self.state = SequenceState::Animating;
                    return SpinnerOutcome::BecameAnimating;
                }
            }
            SequenceState::TransDest => {
                if time < self.end_time {
                    self.trans_spinner = ((time - self.start_time) / window).clamp(0.0, 1.0);
                } else {
                    self.trans_spinner = 1.0;
                    if let Some(frame) = self.dest_frame.take() {
                        if self.frequency > 0.0 {
                            self.offset = frame / self.frequency - time;
                        }
                    }
                    self.state = SequenceState::Animating;
                    return SpinnerOutcome::BecameAnimating;
                }
            }
            SequenceState::EaseOut => {
                if time < self.end_time {
                    self.ease_spinner = ((self.end_time - time) / window).clamp(0.0, 1.0);
                } else {
                    self.ease_spinner = 0.0;
                    return SpinnerOutcome::FinishedEaseOut;
                }
            }
            SequenceState::TransSource => {
                if time < self.end_time {
                    self.trans_spinner = ((self.end_time - time) / window).clamp(0.0, 1.0);
                } else {
                    self.trans_spinner = 0.0;
                    return SpinnerOutcome::FinishedEaseOut;
                }
            }
            SequenceState::Animating => {}
            SequenceState::MorphSource | SequenceState::Inactive => {}
        }
        SpinnerOutcome::Active
    }

    /// Map global time to clip-local time, wrap per the cycle type,
    /// and record the last-time bookkeeping used by zero-ease
    /// deactivation.
    pub fn compute_scaled_time(&mut self, time: f32) -> f32 {
        self.compute_scaled_time_at(self.offset + time, time)
    }

    /// Like `compute_scaled_time` but with the unwarped update time
    /// supplied by the caller, for the destination-frame and partner
    /// frame-mapping overrides.
    pub fn compute_scaled_time_at(&mut self, update_time: f32, time: f32) -> f32 {
        let mut scaled = update_time * self.frequency;
        if self.duration > 0.0 {
            scaled = match self.cycle {
                CycleType::Loop => scaled.rem_euclid(self.duration),
                CycleType::Clamp => scaled.clamp(0.0, self.duration),
            };
        }
        self.weighted_last_time = scaled;
        self.last_time = time;
        scaled
    }

    /// Reverse an ease-out in flight into an ease-in, keeping the
    /// current ease level continuous. The ease window must be positive;
    /// an instant stop or start goes through the plain paths instead.
    pub fn reverse_to_ease_in(&mut self, time: f32, ease_in: f32) -> Result<(), BlendError> {
        if self.state != SequenceState::EaseOut || ease_in <= 0.0 {
            return Err(BlendError::InvalidState);
        }
        let level = self.ease_spinner.clamp(0.0, 1.0);
        self.start_time = time - level * ease_in;
        self.end_time = self.start_time + ease_in;
        self.state = SequenceState::EaseIn;
        Ok(())
    }

    /// Reverse an ease-in (or cut an animating sequence) into an
    /// ease-out without resetting the ease level. The ease window must
    /// be positive.
    pub fn reverse_to_ease_out(&mut self, time: f32, ease_out: f32) -> Result<(), BlendError> {
        if !matches!(
            self.state,
            SequenceState::EaseIn | SequenceState::Animating
        ) || ease_out <= 0.0
        {
            return Err(BlendError::InvalidState);
        }
        let level = if self.state == SequenceState::Animating {
            1.0
        } else {
            self.ease_spinner.clamp(0.0, 1.0)
        };
        self.start_time = time - (1.0 - level) * ease_out;
        self.end_time = self.start_time + ease_out;
        self.state = SequenceState::EaseOut;
        Ok(())
    }

    /// Whether this sequence may time-sync to `partner`. The partner
    /// must cover every target this sequence animates and must not
    /// already be synced back to this sequence.
    pub fn can_sync_to(&self, partner: &Sequence, partner_synced_to_self: bool) -> bool {
        if partner_synced_to_self {
            return false;
        }
        self.blocks.iter().all(|b| {
            partner
                .blocks
                .iter()
                .any(|pb| pb.target_name == b.target_name)
        })
    }

    /// Proportional frame mapping for morph transitions: the local
    /// time in this clip maps to the same fraction of `dest`'s length.
    pub fn corresponding_frame(&self, local_time: f32, dest: &Sequence) -> f32 {
        if self.duration <= 0.0 {
            return 0.0;
        }
        (local_time / self.duration).clamp(0.0, 1.0) * dest.duration
    }
}
