//! Engine: owns targets, samplers, and sequences, and runs the
//! per-update pipeline.
//!
//! Update order per tick:
//! 1. advance the clock;
//! 2. update every active sequence (lazy target resolution, state
//!    machine, push weight/ease/warped-time into attached slots);
//! 3. per target: normalize weights, apply smoothing, blend values,
//!    fill unanimated channels from the rest pose, compose additive
//!    deltas, emit a change.

use hashbrown::HashMap;

use crate::additive::{self, AdditiveMetadata};
use crate::blend::BlendSlotArray;
use crate::config::Config;
use crate::data::{ClipData, CycleType};
use crate::error::BlendError;
use crate::ids::{IdAllocator, SamplerId, SequenceId, TargetId};
use crate::interp::Sampler;
use crate::outputs::{Change, CoreEvent, Outputs};
use crate::sampling::sample_channels;
use crate::scratch::Scratch;
use crate::sequence::{ControlledBlock, Sequence, SequenceState, SpinnerOutcome, UNSET_TIME};
use crate::smoothing::{self, InterpState, SmoothPhase, SmoothingTable, UNSET_WEIGHT};
use crate::transform::BoneTransform;

/// One blendable bone/node.
#[derive(Debug)]
pub struct Target {
    pub name: String,
    /// Pose used to fill channels no contributor animates.
    pub rest: BoneTransform,
    /// Last emitted local transform.
    pub current: BoneTransform,
    pub blend: BlendSlotArray,
    pub smoothing: SmoothingTable,
    /// Stationary pose contributor, present while a freshly attached
    /// clip still needs the held pose to blend from.
    pose_sampler: Option<SamplerId>,
    pose_slot: Option<usize>,
}

impl Target {
    fn new(name: String, rest: BoneTransform, cfg: &Config) -> Self {
        Self {
            name,
            rest,
            current: rest,
            blend: BlendSlotArray::new(cfg),
            smoothing: SmoothingTable::new(),
            pose_sampler: None,
            pose_slot: None,
        }
    }
}

pub struct Engine {
    cfg: Config,
    ids: IdAllocator,
    targets: Vec<Target>,
    by_name: HashMap<String, TargetId>,
    samplers: Vec<Sampler>,
    sequences: Vec<Sequence>,
    scratch: Scratch,
    outputs: Outputs,
    /// Events raised between updates; delivered with the next update.
    pending: Vec<CoreEvent>,
    removed: Vec<(SamplerId, Option<SequenceId>)>,
    time: f32,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Engine {
    pub fn new(cfg: Config) -> Self {
        let scratch = Scratch::new(&cfg);
        Self {
            cfg,
            ids: IdAllocator::new(),
            targets: Vec::new(),
            by_name: HashMap::new(),
            samplers: Vec::new(),
            sequences: Vec::new(),
            scratch,
            outputs: Outputs::new(),
            pending: Vec::new(),
            removed: Vec::new(),
            time: 0.0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    #[inline]
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Register a blendable target. The rest pose fills channels no
    /// contributor animates.
    pub fn add_target(&mut self, name: impl Into<String>, rest: BoneTransform) -> TargetId {
        let name = name.into();
        let id = self.ids.alloc_target();
        if self.by_name.contains_key(&name) {
            log::warn!("target name '{name}' already registered; later clips resolve to the new target");
        }
        self.by_name.insert(name.clone(), id);
        self.targets.push(Target::new(name, rest, &self.cfg));
        id
    }

    pub fn target(&self, id: TargetId) -> Option<&Target> {
        self.targets.get(id.0 as usize)
    }

    pub fn target_by_name(&self, name: &str) -> Option<TargetId> {
        self.by_name.get(name).copied()
    }

    /// Build samplers and an inactive sequence from clip data.
    pub fn add_clip(&mut self, clip: &ClipData) -> Result<SequenceId, BlendError> {
        clip.validate_basic().map_err(BlendError::InvalidClip)?;

        let id = self.ids.alloc_sequence();
        let mut seq = Sequence::new(
            clip.name.clone(),
            clip.duration,
            clip.frequency,
            clip.cycle,
        );
        let mut meta = clip
            .additive_reference_time
            .map(|t| AdditiveMetadata::new(t, true));

        for block in &clip.blocks {
            let sampler_id = self.ids.alloc_sampler();
            self.samplers
                .push(Sampler::keyframe(block.channels.clone()));
            if let Some(meta) = meta.as_mut() {
                meta.reference
                    .insert(sampler_id, sample_channels(&block.channels, meta.reference_time));
            }
            seq.blocks.push(ControlledBlock {
                target_name: block.target.clone(),
                target: self.by_name.get(&block.target).copied(),
                sampler: sampler_id,
                priority: block.priority,
                blend_slot: None,
            });
        }
        seq.additive = meta;
        self.sequences.push(seq);
        Ok(id)
    }

    pub fn sequence(&self, id: SequenceId) -> Option<&Sequence> {
        self.sequences.get(id.0 as usize)
    }

    pub fn sequence_state(&self, id: SequenceId) -> Option<SequenceState> {
        self.sequence(id).map(|s| s.state)
    }

    fn check_sequence(&self, id: SequenceId) -> Result<(), BlendError> {
        if (id.0 as usize) < self.sequences.len() {
            Ok(())
        } else {
            Err(BlendError::UnknownSequence(id))
        }
    }

    /// Activate an inactive sequence with a plain ease-in.
    pub fn activate(
        &mut self,
        id: SequenceId,
        priority: u8,
        weight: f32,
        ease_in: f32,
        partner: Option<SequenceId>,
        start_over: bool,
    ) -> Result<(), BlendError> {
        self.activate_internal(id, priority, weight, ease_in, false, None, partner, start_over)
    }

    /// Activate as the incoming half of a transition: the sequence
    /// ramps its transition spinner instead of its ease spinner, and
    /// may hold `dest_frame` until the transition completes, then jump
    /// there.
    #[allow(clippy::too_many_arguments)]
    pub fn activate_blended(
        &mut self,
        id: SequenceId,
        priority: u8,
        weight: f32,
        duration: f32,
        dest_frame: Option<f32>,
        partner: Option<SequenceId>,
        start_over: bool,
    ) -> Result<(), BlendError> {
        self.activate_internal(
            id, priority, weight, duration, true, dest_frame, partner, start_over,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn activate_internal(
        &mut self,
        id: SequenceId,
        priority: u8,
        weight: f32,
        ease_in: f32,
        transition: bool,
        dest_frame: Option<f32>,
        partner: Option<SequenceId>,
        start_over: bool,
    ) -> Result<(), BlendError> {
        self.check_sequence(id)?;
        if self.sequences[id.0 as usize].is_active() {
            log::warn!(
                "rejected activation of '{}': already animating",
                self.sequences[id.0 as usize].name
            );
            return Err(BlendError::AlreadyActive);
        }
        if let Some(pid) = partner {
            self.check_sequence(pid)?;
            if pid == id {
                return Err(BlendError::IncompatiblePartner);
            }
            let p = &self.sequences[pid.0 as usize];
            let synced_back = p.partner == Some(id);
            if !self.sequences[id.0 as usize].can_sync_to(p, synced_back) {
                log::warn!(
                    "rejected activation of '{}': cannot time-sync to '{}'",
                    self.sequences[id.0 as usize].name,
                    p.name
                );
                return Err(BlendError::IncompatiblePartner);
            }
        }

        {
            let seq = &mut self.sequences[id.0 as usize];
            seq.begin_activation(priority, weight, ease_in, transition, start_over);
            seq.partner = partner;
            if dest_frame.is_some() {
                seq.dest_frame = dest_frame;
            }
        }
        self.attach_sequence(id);
        self.pending
            .push(CoreEvent::SequenceActivated { sequence: id });
        Ok(())
    }

    /// Deactivate an active sequence with a plain ease-out. With zero
    /// ease the sequence stops immediately.
    pub fn deactivate(&mut self, id: SequenceId, ease_out: f32) -> Result<(), BlendError> {
        self.deactivate_internal(id, ease_out, false)
    }

    fn deactivate_internal(
        &mut self,
        id: SequenceId,
        ease_out: f32,
        transition: bool,
    ) -> Result<(), BlendError> {
        self.check_sequence(id)?;
        if !self.sequences[id.0 as usize].is_active() {
            log::warn!(
                "rejected deactivation of '{}': not active",
                self.sequences[id.0 as usize].name
            );
            return Err(BlendError::NotActive);
        }
        let immediate = self.sequences[id.0 as usize].begin_deactivation(ease_out, transition);
        if immediate {
            self.detach_sequence(id);
            self.pending
                .push(CoreEvent::SequenceDeactivated { sequence: id });
        }
        Ok(())
    }

    /// Reverse an ease-out in flight back into an ease-in without a
    /// weight pop. Fails unless the sequence is easing out and the
    /// ease window is positive.
    pub fn activate_no_reset(&mut self, id: SequenceId, ease_in: f32) -> Result<(), BlendError> {
        self.check_sequence(id)?;
        let time = self.time;
        self.sequences[id.0 as usize].reverse_to_ease_in(time, ease_in)?;
        // The contributors are still attached; flip their lifecycle
        // direction so smoothing snaps toward full weight again.
        self.set_sequence_lifecycle(id, InterpState::Activating);
        Ok(())
    }

    /// Reverse an ease-in (or cut an animating sequence) into an
    /// ease-out, keeping the current ease level. Fails with a zero
    /// ease window; an instant stop is a plain `deactivate(id, 0.0)`.
    pub fn deactivate_no_reset(&mut self, id: SequenceId, ease_out: f32) -> Result<(), BlendError> {
        self.check_sequence(id)?;
        let time = self.time;
        self.sequences[id.0 as usize].reverse_to_ease_out(time, ease_out)?;
        self.set_sequence_lifecycle(id, InterpState::Deactivating);
        Ok(())
    }

    /// Deactivate `source` and activate `dest` as a transition pair
    /// over `duration` seconds.
    #[allow(clippy::too_many_arguments)]
    pub fn cross_fade(
        &mut self,
        source: SequenceId,
        dest: SequenceId,
        priority: u8,
        weight: f32,
        duration: f32,
        dest_frame: Option<f32>,
    ) -> Result<(), BlendError> {
        self.check_sequence(source)?;
        self.check_sequence(dest)?;
        if !self.sequences[source.0 as usize].is_active() {
            return Err(BlendError::NotActive);
        }
        if self.sequences[dest.0 as usize].is_active() {
            return Err(BlendError::AlreadyActive);
        }
        self.deactivate_internal(source, duration, true)?;
        self.activate_blended(dest, priority, weight, duration, dest_frame, None, true)
    }

    /// Morph from `source` into `dest`: the source becomes the morph
    /// source and computes the destination's corresponding start frame
    /// on its next update, so the motion continues at the same phase.
    pub fn morph_to(
        &mut self,
        source: SequenceId,
        dest: SequenceId,
        priority: u8,
        weight: f32,
        duration: f32,
    ) -> Result<(), BlendError> {
        self.check_sequence(source)?;
        self.check_sequence(dest)?;
        if !self.sequences[source.0 as usize].is_active() {
            return Err(BlendError::NotActive);
        }
        if self.sequences[dest.0 as usize].is_active() {
            return Err(BlendError::AlreadyActive);
        }
        self.activate_blended(dest, priority, weight, duration, None, None, false)?;
        let src = &mut self.sequences[source.0 as usize];
        src.partner = Some(dest);
        src.start_time = UNSET_TIME;
        src.end_time = duration;
        src.state = SequenceState::MorphSource;
        self.set_sequence_lifecycle(source, InterpState::Deactivating);
        Ok(())
    }

    pub fn set_sequence_weight(&mut self, id: SequenceId, weight: f32) -> Result<(), BlendError> {
        self.check_sequence(id)?;
        self.sequences[id.0 as usize].weight = weight;
        Ok(())
    }

    /// Set the target weight multiplier for an additive sequence's
    /// contributors. The applied multiplier approaches this value with
    /// the same exponential smoothing as normalized weights.
    pub fn set_additive_weight_mult(
        &mut self,
        id: SequenceId,
        mult: f32,
    ) -> Result<(), BlendError> {
        self.check_sequence(id)?;
        let pairs: Vec<(Option<TargetId>, SamplerId)> = self.sequences[id.0 as usize]
            .blocks
            .iter()
            .map(|b| (b.target, b.sampler))
            .collect();
        for (target, sampler) in pairs {
            let Some(target) = target.and_then(|t| self.targets.get_mut(t.0 as usize)) else {
                continue;
            };
            if let Some(i) = target.smoothing.find(sampler) {
                if let Some(entry) = target.smoothing.entry_mut(i) {
                    entry.target_mult = mult;
                }
            }
        }
        Ok(())
    }

    /// Choose whether an additive sequence applies regardless of the
    /// priority band (the default) or only while its own priority
    /// matches the band.
    pub fn set_additive_ignore_priorities(
        &mut self,
        id: SequenceId,
        ignore: bool,
    ) -> Result<(), BlendError> {
        self.check_sequence(id)?;
        match self.sequences[id.0 as usize].additive.as_mut() {
            Some(meta) => {
                meta.ignore_priorities = ignore;
                Ok(())
            }
            None => Err(BlendError::InvalidState),
        }
    }

    /// Advance the clock by `dt` seconds and run the pipeline. Events
    /// raised by operations since the previous update are delivered
    /// together with this update's.
    pub fn update(&mut self, dt: f32) -> &Outputs {
        self.outputs.clear();
        self.time += dt;

        for i in 0..self.sequences.len() {
            if self.sequences[i].is_active() {
                self.step_sequence(SequenceId(i as u32));
            }
        }

        for ti in 0..self.targets.len() {
            self.step_target(TargetId(ti as u32), dt);
        }

        self.outputs.events.append(&mut self.pending);
        &self.outputs
    }

    /// Read access to the outputs of the most recent update.
    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    fn step_sequence(&mut self, id: SequenceId) {
        let i = id.0 as usize;
        let time = self.time;

        self.resolve_pending_blocks(id);

        // Morph source: one-shot computation of the partner's start
        // frame, then fall through to the trans-source spinner.
        if self.sequences[i].state == SequenceState::MorphSource {
            if let Some(pid) = self.sequences[i].partner {
                let src = &self.sequences[i];
                let offset = if src.offset == UNSET_TIME { -time } else { src.offset };
                let local = wrap_local(
                    (offset + time) * src.frequency,
                    src.duration,
                    src.cycle,
                );
                let partner = &self.sequences[pid.0 as usize];
                let frame = src.corresponding_frame(local, partner);
                let partner_freq = partner.frequency.max(f32::EPSILON);
                self.sequences[pid.0 as usize].offset = frame / partner_freq - time;
            }
            self.sequences[i].state = SequenceState::TransSource;
        }

        match self.sequences[i].advance_spinners(time) {
            SpinnerOutcome::FinishedEaseOut => {
                let _ = self.deactivate_internal(id, 0.0, false);
                return;
            }
            SpinnerOutcome::Active | SpinnerOutcome::BecameAnimating => {}
        }

        // Unwarped update time: destination-frame override, then
        // partner frame mapping, then plain offset time.
        let update_raw = {
            let seq = &self.sequences[i];
            let freq = seq.frequency.max(f32::EPSILON);
            if let Some(frame) = seq.dest_frame {
                frame / freq
            } else if let Some(pid) = seq.partner {
                let p = &self.sequences[pid.0 as usize];
                if p.offset != UNSET_TIME && p.duration > 0.0 {
                    let p_local =
                        wrap_local((p.offset + time) * p.frequency, p.duration, p.cycle);
                    p.corresponding_frame(p_local, seq) / freq
                } else {
                    seq.offset + time
                }
            } else {
                seq.offset + time
            }
        };

        let (scaled, weight, ease) = {
            let seq = &mut self.sequences[i];
            let scaled = seq.compute_scaled_time_at(update_raw, time);
            (scaled, seq.weight * seq.trans_spinner, seq.ease_spinner)
        };

        // Push into every attached slot.
        for bi in 0..self.sequences[i].blocks.len() {
            let b = &self.sequences[i].blocks[bi];
            let (Some(target), Some(slot)) = (b.target, b.blend_slot) else {
                continue;
            };
            if let Some(t) = self.targets.get_mut(target.0 as usize) {
                t.blend.set_update(slot, weight, ease, scaled);
            }
        }
    }

    /// Resolve blocks whose target did not exist at activation time.
    /// A miss is recoverable: the block attaches on a later update.
    fn resolve_pending_blocks(&mut self, id: SequenceId) {
        let i = id.0 as usize;
        for bi in 0..self.sequences[i].blocks.len() {
            if self.sequences[i].blocks[bi].blend_slot.is_some() {
                continue;
            }
            let (resolved, name, sampler, priority) = {
                let seq = &self.sequences[i];
                let b = &seq.blocks[bi];
                (
                    b.target,
                    b.target_name.clone(),
                    b.sampler,
                    b.priority.unwrap_or(seq.activation_priority),
                )
            };
            let target = match resolved.or_else(|| self.by_name.get(&name).copied()) {
                Some(t) => t,
                None => {
                    log::debug!("target '{name}' not registered yet; will retry");
                    continue;
                }
            };
            let additive = self.sequences[i].additive.is_some();
            let slot = self.attach_block(target, sampler, priority, id, additive);
            let b = &mut self.sequences[i].blocks[bi];
            b.target = Some(target);
            b.blend_slot = Some(slot);
        }
    }

    fn attach_sequence(&mut self, id: SequenceId) {
        self.resolve_pending_blocks(id);
    }

    /// Attach one contributor to a target, reusing a parked slot if
    /// the contributor is still fading out from an earlier detach.
    fn attach_block(
        &mut self,
        target: TargetId,
        sampler: SamplerId,
        priority: u8,
        sequence: SequenceId,
        additive: bool,
    ) -> usize {
        let ti = target.0 as usize;
        let t = &mut self.targets[ti];
        let entry_idx = t.smoothing.obtain(sampler);

        let parked = t
            .smoothing
            .entry(entry_idx)
            .filter(|e| e.detached)
            .and_then(|e| e.slot);

        let slot = if let Some(slot) = parked {
            t.blend.set_priority(slot, priority);
            if let Some(s) = t.blend.slot_mut(slot) {
                s.additive = additive;
            }
            if let Some(e) = t.smoothing.entry_mut(entry_idx) {
                e.detached = false;
                e.phase = SmoothPhase::ReattachedWhileSmoothing;
            }
            slot
        } else {
            let slot = t.blend.add_slot(sampler, 0.0, 0.0, priority, additive);
            if let Some(e) = t.smoothing.entry_mut(entry_idx) {
                e.slot = Some(slot);
                e.phase = SmoothPhase::AttachedNormally;
            }
            self.pending
                .push(CoreEvent::ContributorAttached { target, sampler });
            slot
        };
        if let Some(e) = t.smoothing.entry_mut(entry_idx) {
            e.sequence = Some(sequence);
            e.state = InterpState::Activating;
            e.additive = additive;
            if additive {
                e.target_mult = 1.0;
            }
        }

        if self.cfg.pose_samplers && !additive {
            self.ensure_pose_contributor(target);
        }
        slot
    }

    /// Give a freshly attached lone contributor the held pose to blend
    /// from: a stationary pose sampler at priority 0, seeded at full
    /// smoothed weight and fading out from birth.
    fn ensure_pose_contributor(&mut self, target: TargetId) {
        if !self.cfg.blend_smoothing {
            return;
        }
        let ti = target.0 as usize;
        if self.targets[ti].pose_slot.is_some() {
            // Re-capture the held transform for the new blend.
            let current = self.targets[ti].current;
            if let Some(ps) = self.targets[ti].pose_sampler {
                if let Some(s) = self.samplers.get_mut(ps.0 as usize) {
                    s.refresh_pose(current);
                }
            }
            return;
        }
        if self.targets[ti].blend.contributor_count() != 1 {
            return;
        }

        let current = self.targets[ti].current;
        let pose_id = self.ids.alloc_sampler();
        self.samplers.push(Sampler::pose(current));

        let t = &mut self.targets[ti];
        let slot = t.blend.add_slot(pose_id, 1.0, 1.0, 0, false);
        let entry_idx = t.smoothing.obtain(pose_id);
        if let Some(e) = t.smoothing.entry_mut(entry_idx) {
            e.slot = Some(slot);
            e.is_pose = true;
            e.detached = true;
            e.state = InterpState::Deactivating;
            e.smoothed_weight = 1.0;
            e.phase = SmoothPhase::AttachedNormally;
        }
        t.pose_sampler = Some(pose_id);
        t.pose_slot = Some(slot);
    }

    /// Detach every attached contributor of a sequence. A contributor
    /// whose smoothed weight is still visible keeps its slot parked at
    /// priority zero and fades out in the smoothing pass; otherwise the
    /// slot is removed right away.
    fn detach_sequence(&mut self, id: SequenceId) {
        let i = id.0 as usize;
        for bi in 0..self.sequences[i].blocks.len() {
            let (target, sampler, slot) = {
                let b = &self.sequences[i].blocks[bi];
                (b.target, b.sampler, b.blend_slot)
            };
            let (Some(target), Some(slot)) = (target, slot) else {
                self.sequences[i].blocks[bi].blend_slot = None;
                continue;
            };
            let t = &mut self.targets[target.0 as usize];
            let entry_idx = t.smoothing.find(sampler);

            let keep_fading = self.cfg.blend_smoothing
                && entry_idx
                    .and_then(|e| t.smoothing.entry(e))
                    .map(|e| {
                        e.smoothed_weight != UNSET_WEIGHT
                            && e.smoothed_weight >= self.cfg.min_smoothed_weight
                    })
                    .unwrap_or(false);

            if keep_fading {
                let e = entry_idx.and_then(|e| t.smoothing.entry_mut(e));
                if let Some(e) = e {
                    e.state = InterpState::Deactivating;
                    e.detached = true;
                    e.slot = Some(slot);
                    e.phase = SmoothPhase::DetachedButSmoothing;
                }
                t.blend.set_priority(slot, 0);
            } else {
                t.blend.remove_slot(slot);
                if let Some(e) = entry_idx {
                    t.smoothing.clear(e);
                }
                self.pending
                    .push(CoreEvent::ContributorDetached { target, sampler });
                Self::drop_lone_pose(t, &mut self.pending, target);
            }
            self.sequences[i].blocks[bi].blend_slot = None;
        }
    }

    /// Flip the lifecycle direction of every attached contributor
    /// (used by the no-reset ease reversals).
    fn set_sequence_lifecycle(&mut self, id: SequenceId, state: InterpState) {
        let i = id.0 as usize;
        let pairs: Vec<(Option<TargetId>, SamplerId)> = self.sequences[i]
            .blocks
            .iter()
            .map(|b| (b.target, b.sampler))
            .collect();
        for (target, sampler) in pairs {
            let Some(t) = target.and_then(|t| self.targets.get_mut(t.0 as usize)) else {
                continue;
            };
            if let Some(idx) = t.smoothing.find(sampler) {
                if let Some(e) = t.smoothing.entry_mut(idx) {
                    e.state = state;
                }
            }
        }
    }

    /// Remove the pose contributor once it is the only slot left.
    fn drop_lone_pose(t: &mut Target, pending: &mut Vec<CoreEvent>, target: TargetId) {
        let (Some(pose_slot), Some(pose_sampler)) = (t.pose_slot, t.pose_sampler) else {
            return;
        };
        if t.blend.contributor_count() != 1 || t.blend.slot(pose_slot).is_none() {
            return;
        }
        t.blend.remove_slot(pose_slot);
        if let Some(i) = t.smoothing.find(pose_sampler) {
            t.smoothing.clear(i);
        }
        t.pose_slot = None;
        t.pose_sampler = None;
        pending.push(CoreEvent::ContributorDetached {
            target,
            sampler: pose_sampler,
        });
    }

    fn step_target(&mut self, id: TargetId, dt: f32) {
        let ti = id.0 as usize;
        if self.targets[ti].blend.occupied_count() == 0 {
            return;
        }

        // The pose contributor holds weight 1 at ease 1 every frame.
        if let Some(ps) = self.targets[ti].pose_slot {
            self.targets[ti].blend.set_update(ps, 1.0, 1.0, 0.0);
        }

        self.targets[ti].blend.compute_normalized_weights();

        if self.cfg.blend_smoothing {
            self.removed.clear();
            let t = &mut self.targets[ti];
            smoothing::apply(&mut t.smoothing, &mut t.blend, dt, &self.cfg, &mut self.removed);
            for ri in 0..self.removed.len() {
                let (sampler, _) = self.removed[ri];
                let t = &mut self.targets[ti];
                if t.pose_sampler == Some(sampler) {
                    t.pose_sampler = None;
                    t.pose_slot = None;
                }
                self.pending
                    .push(CoreEvent::ContributorDetached { target: id, sampler });
            }
            let t = &mut self.targets[ti];
            Self::drop_lone_pose(t, &mut self.pending, id);
            if t.blend.occupied_count() == 0 {
                return;
            }
        }

        let t = &mut self.targets[ti];
        // Fill unanimated channels from the rest pose first so a lone
        // additive layer still has a base to compose onto.
        let mut blended = t
            .blend
            .blend_values(&self.samplers, &mut self.scratch)
            .or_else_from(&t.rest);

        // Additive layers compose after the main blend.
        let band = t.blend.highest_priority();
        for (_, slot) in t.blend.iter_occupied() {
            if !slot.additive {
                continue;
            }
            let (Some(sampler), Some(time)) = (slot.sampler, slot.update_time) else {
                continue;
            };
            let mult = t
                .smoothing
                .find(sampler)
                .and_then(|i| t.smoothing.entry(i))
                .map(|e| e.smoothed_mult)
                .unwrap_or(1.0);
            let seq = t
                .smoothing
                .find(sampler)
                .and_then(|i| t.smoothing.entry(i))
                .and_then(|e| e.sequence);
            let Some(meta) = seq
                .and_then(|s| self.sequences.get(s.0 as usize))
                .and_then(|s| s.additive.as_ref())
            else {
                continue;
            };
            if !meta.ignore_priorities && slot.priority < band {
                continue;
            }
            let Some(s) = self.samplers.get(sampler.0 as usize) else {
                continue;
            };
            let delta = meta.delta(sampler, &s.sample(time));
            let w = slot.weight * slot.ease_spinner * mult;
            additive::apply_delta(&mut blended, &delta, w);
        }

        let transform = blended;
        t.current = transform;
        self.outputs.push_change(Change {
            target: id,
            name: t.name.clone(),
            transform,
        });
    }
}

/// Wrap a scaled local time into clip bounds.
fn wrap_local(scaled: f32, duration: f32, cycle: CycleType) -> f32 {
    if duration <= 0.0 {
        return scaled;
    }
    match cycle {
        CycleType::Loop => scaled.rem_euclid(duration),
        CycleType::Clamp => scaled.clamp(0.0, duration),
    }
}
