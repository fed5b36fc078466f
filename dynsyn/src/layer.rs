// src/layer.rs
//
// The synergy-weighted action-expansion layer.
//
// Per evaluation:
//   weights = WeightSampler(hidden, amp)        [rows, C]
//   actions = ExpansionEngine::expand(x)        [rows, M]
//   actions[:, weight_indices] *= weights       (Compositor)
//
// Variants:
// - DynSynLayer:           the composition above
// - BoundedDynSynLayer:    clamps the composed action to [-1, 1]; weighting can
//                          push a follower past the bound even though both
//                          factors are individually bounded
// - RevertibleDynSynLayer: adds `revert`, the leader projection back to
//                          per-group width used to keep a compressed-space
//                          distribution consistent with the executed action
//
// Index tables are built once and only relocated between placements. The
// amplitude is the only mutable state; each call takes one snapshot of it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::compositor::Compositor;
use crate::curriculum::CurriculumAmplitude;
use crate::error::{ensure_width, DynSynError, Result};
use crate::expansion::ExpansionEngine;
use crate::groups::{GroupIndex, MuscleGroupSpec};
use crate::placement::{ActionBatch, Placement, PlacedTables};
use crate::projection::{LinearProjection, Projection};
use crate::telemetry::ForwardStats;
use crate::weights::WeightSampler;

pub struct DynSynLayer<P = LinearProjection> {
    spec: MuscleGroupSpec,
    tables: PlacedTables<GroupIndex>,
    sampler: WeightSampler<P>,
    amp: CurriculumAmplitude,
    calls: AtomicU64,
}

impl<P: Projection> DynSynLayer<P> {
    /// Build the index tables and wire the weight head.
    ///
    /// Fails if the spec does not partition `[0, M)`, if `projection` does not
    /// output `M - G` logits, or if `log_std` / `initial_amp` are unusable.
    pub fn new(
        spec: MuscleGroupSpec,
        projection: P,
        log_std: f32,
        initial_amp: f32,
    ) -> Result<Self> {
        let index = spec.build()?;
        let sampler = WeightSampler::new(projection, index.compressed_dim, log_std)?;
        Ok(Self {
            spec,
            tables: PlacedTables::new(index, Placement::Host),
            sampler,
            amp: CurriculumAmplitude::new(initial_amp)?,
            calls: AtomicU64::new(0),
        })
    }

    pub fn spec(&self) -> &MuscleGroupSpec {
        &self.spec
    }

    pub fn index(&self) -> Arc<GroupIndex> {
        self.tables.current()
    }

    pub fn actuator_count(&self) -> usize {
        self.tables.current().actuator_count
    }

    pub fn group_count(&self) -> usize {
        self.tables.current().group_count
    }

    pub fn compressed_dim(&self) -> usize {
        self.sampler.compressed_dim()
    }

    pub fn hidden_dim(&self) -> usize {
        self.sampler.projection().input_dim()
    }

    pub fn log_std(&self) -> f32 {
        self.sampler.log_std()
    }

    pub fn projection(&self) -> &P {
        self.sampler.projection()
    }

    pub fn projection_mut(&mut self) -> &mut P {
        self.sampler.projection_mut()
    }

    pub fn weight_amp(&self) -> f32 {
        self.amp.get()
    }

    /// Set the curriculum amplitude. Called by the schedule controller
    /// between evaluations.
    pub fn update_weight_amp(&self, amp: f32) -> Result<()> {
        self.amp.set(amp)
    }

    /// Placement the index tables currently reside on.
    pub fn placement(&self) -> Placement {
        self.tables.placement()
    }

    pub fn relocations(&self) -> u64 {
        self.tables.relocations()
    }

    /// Broadcast `x` (`[rows, G]`) into actuator space without weighting.
    pub fn expand(&self, x: &ActionBatch) -> Result<ActionBatch> {
        let index = self.tables.ensure_placement(x.placement());
        ExpansionEngine::expand(&index, x)
    }

    /// Follower weights for `hidden` at the current amplitude.
    pub fn sample_weights<R: Rng + ?Sized>(
        &self,
        hidden: &ActionBatch,
        deterministic: bool,
        rng: &mut R,
    ) -> Result<ActionBatch> {
        self.sampler
            .sample(hidden, self.weight_amp(), deterministic, rng)
    }

    /// Apply precomputed weights to an expanded action in place.
    pub fn compose(&self, expanded: &mut ActionBatch, weights: &ActionBatch) -> Result<()> {
        let index = self.tables.ensure_placement(expanded.placement());
        Compositor::compose(&index, expanded, weights)
    }

    pub fn forward<R: Rng + ?Sized>(
        &self,
        x: &ActionBatch,
        hidden: &ActionBatch,
        deterministic: bool,
        rng: &mut R,
    ) -> Result<ActionBatch> {
        self.forward_with_stats(x, hidden, deterministic, rng)
            .map(|(actions, _)| actions)
    }

    pub fn forward_with_stats<R: Rng + ?Sized>(
        &self,
        x: &ActionBatch,
        hidden: &ActionBatch,
        deterministic: bool,
        rng: &mut R,
    ) -> Result<(ActionBatch, ForwardStats)> {
        ensure_width("hidden representation rows", x.rows(), hidden.rows())?;

        let index = self.tables.ensure_placement(x.placement());
        let mut actions = ExpansionEngine::expand(&index, x)?;

        let amp = self.weight_amp();
        let weights = self
            .sampler
            .sample(hidden, amp, deterministic, rng)?
            .with_placement(x.placement());
        Compositor::compose(&index, &mut actions, &weights)?;

        let call_index = self.calls.fetch_add(1, Ordering::Relaxed);
        let stats = ForwardStats::from_weights(
            call_index,
            amp,
            deterministic,
            index.actuator_count,
            &weights,
        );
        Ok((actions, stats))
    }

    /// Leader projection `[rows, M] -> [rows, G]`.
    fn project_leaders(&self, actions: &ActionBatch) -> Result<ActionBatch> {
        let index = self.tables.ensure_placement(actions.placement());
        ExpansionEngine::collapse(&index, actions)
    }
}

impl<P: Clone> Clone for DynSynLayer<P> {
    fn clone(&self) -> Self {
        Self {
            spec: self.spec.clone(),
            tables: self.tables.clone(),
            sampler: self.sampler.clone(),
            amp: self.amp.clone(),
            calls: AtomicU64::new(self.calls.load(Ordering::Relaxed)),
        }
    }
}

impl<P> fmt::Debug for DynSynLayer<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index = self.tables.current();
        f.debug_struct("DynSynLayer")
            .field("actuator_count", &index.actuator_count)
            .field("group_count", &index.group_count)
            .field("compressed_dim", &index.compressed_dim)
            .field("amp", &self.amp.get())
            .field("tables", &self.tables)
            .finish()
    }
}

/// Layer for optimizers that require actions in `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct BoundedDynSynLayer<P = LinearProjection> {
    base: DynSynLayer<P>,
}

impl<P: Projection> BoundedDynSynLayer<P> {
    pub fn new(base: DynSynLayer<P>) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &DynSynLayer<P> {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut DynSynLayer<P> {
        &mut self.base
    }

    pub fn into_inner(self) -> DynSynLayer<P> {
        self.base
    }

    pub fn forward<R: Rng + ?Sized>(
        &self,
        x: &ActionBatch,
        hidden: &ActionBatch,
        deterministic: bool,
        rng: &mut R,
    ) -> Result<ActionBatch> {
        self.forward_with_stats(x, hidden, deterministic, rng)
            .map(|(actions, _)| actions)
    }

    pub fn forward_with_stats<R: Rng + ?Sized>(
        &self,
        x: &ActionBatch,
        hidden: &ActionBatch,
        deterministic: bool,
        rng: &mut R,
    ) -> Result<(ActionBatch, ForwardStats)> {
        let (mut actions, mut stats) =
            self.base.forward_with_stats(x, hidden, deterministic, rng)?;
        stats.clamped = Compositor::clamp_unit(&mut actions);
        Ok((actions, stats))
    }
}

/// Layer for optimizers that re-evaluate a per-group distribution on the
/// executed actuator action.
#[derive(Debug, Clone)]
pub struct RevertibleDynSynLayer<P = LinearProjection> {
    base: DynSynLayer<P>,
}

impl<P: Projection> RevertibleDynSynLayer<P> {
    pub fn new(base: DynSynLayer<P>) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &DynSynLayer<P> {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut DynSynLayer<P> {
        &mut self.base
    }

    pub fn into_inner(self) -> DynSynLayer<P> {
        self.base
    }

    pub fn forward<R: Rng + ?Sized>(
        &self,
        x: &ActionBatch,
        hidden: &ActionBatch,
        deterministic: bool,
        rng: &mut R,
    ) -> Result<ActionBatch> {
        self.base.forward(x, hidden, deterministic, rng)
    }

    pub fn forward_with_stats<R: Rng + ?Sized>(
        &self,
        x: &ActionBatch,
        hidden: &ActionBatch,
        deterministic: bool,
        rng: &mut R,
    ) -> Result<(ActionBatch, ForwardStats)> {
        self.base.forward_with_stats(x, hidden, deterministic, rng)
    }

    /// Select the leader/singleton columns of an actuator-space action.
    pub fn revert(&self, actions: &ActionBatch) -> Result<ActionBatch> {
        self.base.project_leaders(actions)
    }
}

/// Which composition policy a config-built layer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerVariant {
    #[default]
    Base,
    #[serde(alias = "sac")]
    Bounded,
    #[serde(alias = "ppo")]
    Revert,
}

impl LayerVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerVariant::Base => "base",
            LayerVariant::Bounded => "bounded",
            LayerVariant::Revert => "revert",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "base" => Some(LayerVariant::Base),
            "bounded" | "sac" => Some(LayerVariant::Bounded),
            "revert" | "ppo" => Some(LayerVariant::Revert),
            _ => None,
        }
    }
}

impl fmt::Display for LayerVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any of the three layers, chosen at runtime.
#[derive(Debug, Clone)]
pub enum PolicyLayer<P = LinearProjection> {
    Base(DynSynLayer<P>),
    Bounded(BoundedDynSynLayer<P>),
    Revert(RevertibleDynSynLayer<P>),
}

impl<P: Projection> PolicyLayer<P> {
    pub fn from_variant(variant: LayerVariant, base: DynSynLayer<P>) -> Self {
        match variant {
            LayerVariant::Base => PolicyLayer::Base(base),
            LayerVariant::Bounded => PolicyLayer::Bounded(BoundedDynSynLayer::new(base)),
            LayerVariant::Revert => PolicyLayer::Revert(RevertibleDynSynLayer::new(base)),
        }
    }

    pub fn variant(&self) -> LayerVariant {
        match self {
            PolicyLayer::Base(_) => LayerVariant::Base,
            PolicyLayer::Bounded(_) => LayerVariant::Bounded,
            PolicyLayer::Revert(_) => LayerVariant::Revert,
        }
    }

    pub fn base(&self) -> &DynSynLayer<P> {
        match self {
            PolicyLayer::Base(l) => l,
            PolicyLayer::Bounded(l) => l.base(),
            PolicyLayer::Revert(l) => l.base(),
        }
    }

    pub fn base_mut(&mut self) -> &mut DynSynLayer<P> {
        match self {
            PolicyLayer::Base(l) => l,
            PolicyLayer::Bounded(l) => l.base_mut(),
            PolicyLayer::Revert(l) => l.base_mut(),
        }
    }

    pub fn forward<R: Rng + ?Sized>(
        &self,
        x: &ActionBatch,
        hidden: &ActionBatch,
        deterministic: bool,
        rng: &mut R,
    ) -> Result<ActionBatch> {
        self.forward_with_stats(x, hidden, deterministic, rng)
            .map(|(actions, _)| actions)
    }

    pub fn forward_with_stats<R: Rng + ?Sized>(
        &self,
        x: &ActionBatch,
        hidden: &ActionBatch,
        deterministic: bool,
        rng: &mut R,
    ) -> Result<(ActionBatch, ForwardStats)> {
        match self {
            PolicyLayer::Base(l) => l.forward_with_stats(x, hidden, deterministic, rng),
            PolicyLayer::Bounded(l) => l.forward_with_stats(x, hidden, deterministic, rng),
            PolicyLayer::Revert(l) => l.forward_with_stats(x, hidden, deterministic, rng),
        }
    }

    pub fn revert(&self, actions: &ActionBatch) -> Result<ActionBatch> {
        match self {
            PolicyLayer::Revert(l) => l.revert(actions),
            other => Err(DynSynError::Unsupported {
                operation: "revert",
                variant: other.variant().as_str(),
            }),
        }
    }

    pub fn update_weight_amp(&self, amp: f32) -> Result<()> {
        self.base().update_weight_amp(amp)
    }

    pub fn weight_amp(&self) -> f32 {
        self.base().weight_amp()
    }
}
