//! DynSyn core library.
//!
//! Synergy-weighted action expansion for muscle-actuated RL policies. A
//! policy emits one activation per muscle group; the layer broadcasts it to
//! every actuator in the group and perturbs the followers with learned,
//! amplitude-bounded weights. The binary (`src/main.rs`) is a thin
//! inspection harness around these components.
//!
//! # Pipeline
//!
//! - **Groups** (`groups`): validates the muscle-group partition and derives
//!   the static index tables.
//! - **Weights** (`projection`, `distribution`, `weights`): hidden
//!   representation -> squashed Gaussian -> rescaled multiplicative weights
//!   in `1 ± amp`.
//! - **Expansion** (`expansion`, `compositor`): broadcast and reorder the
//!   per-group action, then scale the follower columns.
//! - **Layers** (`layer`): the base, bounded and revertible variants.
//!
//! # Around the layer
//!
//! - **Curriculum** (`curriculum`): shared amplitude and its schedule
//! - **Config / checkpoints** (`config`, `checkpoint`)
//! - **Action wrappers** (`action_wrappers`): post-layer transforms by name
//! - **Telemetry / traces** (`telemetry`, `trace`)

pub mod action_wrappers;
pub mod checkpoint;
pub mod compositor;
pub mod config;
pub mod curriculum;
pub mod distribution;
pub mod error;
pub mod expansion;
pub mod groups;
pub mod layer;
pub mod placement;
pub mod projection;
pub mod telemetry;
pub mod trace;
pub mod weights;

// --- Re-exports for ergonomic external use ---------------------------------

pub use error::{ConfigError, DynSynError, Result};
pub use groups::{GroupIndex, MuscleGroupSpec};
pub use placement::{ActionBatch, Placement};

pub use layer::{BoundedDynSynLayer, DynSynLayer, LayerVariant, PolicyLayer, RevertibleDynSynLayer};

pub use config::LayerConfig;
pub use checkpoint::{LayerCheckpoint, CHECKPOINT_VERSION};
pub use curriculum::{CurriculumAmplitude, CurriculumSchedule};
pub use projection::{LinearProjection, Projection};
pub use weights::{WeightSampler, WEIGHT_SCALE};

pub use action_wrappers::{ActionWrapper, WrapperChain, WrapperRegistry, WrapperSpec};
pub use telemetry::{ForwardStats, LayerTelemetry};
pub use trace::{EpisodeTrace, TraceWriter};
