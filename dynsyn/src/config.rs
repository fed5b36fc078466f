// src/config.rs
//
// Layer configuration.
//
// A config file is YAML:
//
//   muscle_groups: [[0], [1, 2, 3], [4, 5]]
//   hidden_dim: 64
//   log_std: 0.0
//   initial_weight_amp: 0.0
//   variant: bounded            # base | bounded (sac) | revert (ppo)
//   seed: 0
//   schedule: { kind: linear, start: 0.0, end: 0.1, ramp_steps: 1000000 }
//   wrappers:
//     - name: activation_direct
//
// Validation runs eagerly on load, so an invalid muscle-group spec is
// rejected before any layer exists. Env overrides (applied on top of the
// file, each logged to stderr):
//   - DYNSYN_LOG_STD     (f32)
//   - DYNSYN_WEIGHT_AMP  (f32, >= 0)
//   - DYNSYN_SEED        (u64)

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::action_wrappers::{WrapperChain, WrapperRegistry, WrapperSpec};
use crate::curriculum::CurriculumSchedule;
use crate::error::{ConfigError, DynSynError, Result};
use crate::groups::{GroupIndex, MuscleGroupSpec};
use crate::layer::{DynSynLayer, LayerVariant, PolicyLayer};
use crate::projection::LinearProjection;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub muscle_groups: MuscleGroupSpec,
    /// Width of the hidden representation fed to the weight projection.
    pub hidden_dim: usize,
    /// Fixed log standard deviation of the weight-sampling noise.
    #[serde(default)]
    pub log_std: f32,
    #[serde(default)]
    pub initial_weight_amp: f32,
    #[serde(default)]
    pub variant: LayerVariant,
    /// Seed for the projection's initial parameters.
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub schedule: Option<CurriculumSchedule>,
    #[serde(default)]
    pub wrappers: Vec<WrapperSpec>,
}

impl LayerConfig {
    pub fn new(muscle_groups: Vec<Vec<usize>>, hidden_dim: usize) -> Self {
        Self {
            muscle_groups: MuscleGroupSpec::new(muscle_groups),
            hidden_dim,
            log_std: 0.0,
            initial_weight_amp: 0.0,
            variant: LayerVariant::Base,
            seed: 0,
            schedule: None,
            wrappers: Vec::new(),
        }
    }

    pub fn with_variant(mut self, variant: LayerVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_log_std(mut self, log_std: f32) -> Self {
        self.log_std = log_std;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| DynSynError::Io {
            path: path.as_ref().display().to_string(),
            source: e.to_string(),
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let cfg: LayerConfig = serde_yaml::from_str(yaml).map_err(|e| DynSynError::Parse {
            source: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate every field; returns the derived index tables on success.
    pub fn validate(&self) -> Result<GroupIndex> {
        let index = self.muscle_groups.build()?;
        if self.hidden_dim == 0 {
            return Err(validation("hidden_dim", "must be > 0"));
        }
        if !self.log_std.is_finite() {
            return Err(validation("log_std", "must be finite"));
        }
        if !self.initial_weight_amp.is_finite() || self.initial_weight_amp < 0.0 {
            return Err(validation("initial_weight_amp", "must be finite and >= 0"));
        }
        if let Some(schedule) = &self.schedule {
            schedule
                .validate()
                .map_err(|e| validation("schedule", &e.to_string()))?;
        }
        for (i, w) in self.wrappers.iter().enumerate() {
            if w.name.trim().is_empty() {
                return Err(validation(&format!("wrappers[{}].name", i), "cannot be empty"));
            }
        }
        Ok(index)
    }

    /// Apply `DYNSYN_*` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("DYNSYN_LOG_STD") {
            match raw.trim().parse::<f32>() {
                Ok(v) if v.is_finite() => {
                    self.log_std = v;
                    eprintln!("[config] DYNSYN_LOG_STD = {} (overrode default)", v);
                }
                _ => eprintln!(
                    "[config] WARN: could not parse DYNSYN_LOG_STD = {:?} as f32; using {}",
                    raw, self.log_std
                ),
            }
        }

        if let Some(raw) = lookup("DYNSYN_WEIGHT_AMP") {
            match raw.trim().parse::<f32>() {
                Ok(v) if v.is_finite() && v >= 0.0 => {
                    self.initial_weight_amp = v;
                    eprintln!("[config] DYNSYN_WEIGHT_AMP = {} (overrode default)", v);
                }
                _ => eprintln!(
                    "[config] WARN: could not parse DYNSYN_WEIGHT_AMP = {:?} as non-negative f32; using {}",
                    raw, self.initial_weight_amp
                ),
            }
        }

        if let Some(raw) = lookup("DYNSYN_SEED") {
            match raw.trim().parse::<u64>() {
                Ok(v) => {
                    self.seed = v;
                    eprintln!("[config] DYNSYN_SEED = {} (overrode default)", v);
                }
                Err(_) => eprintln!(
                    "[config] WARN: could not parse DYNSYN_SEED = {:?} as u64; using {}",
                    raw, self.seed
                ),
            }
        }

        self
    }

    /// Build the configured layer with a freshly seeded projection.
    pub fn build_layer(&self) -> Result<PolicyLayer> {
        let index = self.validate()?;
        let projection = LinearProjection::seeded(self.hidden_dim, index.compressed_dim, self.seed);
        let base = DynSynLayer::new(
            self.muscle_groups.clone(),
            projection,
            self.log_std,
            self.initial_weight_amp,
        )?;
        Ok(PolicyLayer::from_variant(self.variant, base))
    }

    pub fn build_wrappers(&self, registry: &WrapperRegistry) -> Result<WrapperChain> {
        registry.build_chain(&self.wrappers)
    }

    /// Amplitude schedule, or a constant one at `initial_weight_amp`.
    pub fn effective_schedule(&self) -> CurriculumSchedule {
        self.schedule
            .clone()
            .unwrap_or(CurriculumSchedule::Constant {
                amp: self.initial_weight_amp,
            })
    }
}

fn validation(field: &str, message: &str) -> DynSynError {
    ConfigError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}
