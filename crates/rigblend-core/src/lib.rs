//! rigblend-core (engine-agnostic)
//!
//! Real-time skeletal animation blending: per-target blend slots with
//! two-priority-band weight normalization, a sequence lifecycle state
//! machine with ease/transition spinners, an exponential weight
//! smoothing side-table, and additive layering over the blended base.
//!
//! The crate owns no scene graph. Consumers register named targets,
//! load clips, drive the lifecycle operations, and read back one
//! blended local transform per target each update.

pub mod additive;
pub mod blend;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod ids;
pub mod interp;
pub mod outputs;
pub mod sampling;
pub mod scratch;
pub mod sequence;
pub mod smoothing;
pub mod stored_clip;
pub mod transform;

// Re-exports for consumers (adapters)
pub use additive::AdditiveMetadata;
pub use blend::{BlendSlot, BlendSlotArray};
pub use config::{Config, WeightMode};
pub use data::{BlockData, ChannelData, ClipData, CycleType, FloatKey, KeyInterp, QuatKey, Vec3Key};
pub use engine::{Engine, Target};
pub use error::BlendError;
pub use ids::{SamplerId, SequenceId, TargetId};
pub use interp::Sampler;
pub use outputs::{Change, CoreEvent, Outputs};
pub use scratch::Scratch;
pub use sequence::{ControlledBlock, Sequence, SequenceState};
pub use smoothing::{InterpState, SmoothingEntry, SmoothingTable};
pub use stored_clip::parse_stored_clip_json;
pub use transform::{BoneTransform, Quat, Vec3};
