// src/weights.rs
//
// Follower weight sampler.
//
//   mu = projection(h)                      width C, one logit per follower
//   s  = squashed_gaussian(mu, log_std)     s in (-1, 1)^C
//   w  = clamp(s * 0.1, -amp, amp) + 1      centred on 1
//
// With amp = 0 every weight is exactly 1.

use rand::Rng;

use crate::curriculum::validate_amp;
use crate::distribution::SquashedDiagGaussian;
use crate::error::{ensure_width, ConfigError, Result};
use crate::placement::ActionBatch;
use crate::projection::{LinearProjection, Projection};

/// Scale applied to the squashed sample before the curriculum clamp.
pub const WEIGHT_SCALE: f32 = 0.1;

/// Map one squashed sample to a follower weight. `amp` must be finite and
/// non-negative.
#[inline]
pub(crate) fn rescale_weight(sample: f32, amp: f32) -> f32 {
    (sample * WEIGHT_SCALE).clamp(-amp, amp) + 1.0
}

#[derive(Debug, Clone)]
pub struct WeightSampler<P = LinearProjection> {
    projection: P,
    distribution: SquashedDiagGaussian,
    log_std: f32,
}

impl<P: Projection> WeightSampler<P> {
    /// `projection` must produce exactly `compressed_dim` logits.
    pub fn new(projection: P, compressed_dim: usize, log_std: f32) -> Result<Self> {
        ensure_width("projection output", compressed_dim, projection.output_dim())?;
        if !log_std.is_finite() {
            return Err(ConfigError::Validation {
                field: "log_std".to_string(),
                message: format!("must be finite, got {}", log_std),
            }
            .into());
        }
        Ok(Self {
            projection,
            distribution: SquashedDiagGaussian::new(compressed_dim),
            log_std,
        })
    }

    /// Bounded weights, one row per hidden row, width C.
    ///
    /// Fails with `InvalidAmplitude` unless `amp` is finite and >= 0.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        hidden: &ActionBatch,
        amp: f32,
        deterministic: bool,
        rng: &mut R,
    ) -> Result<ActionBatch> {
        validate_amp(amp)?;
        let mean = self.projection.forward(hidden)?;
        let mut weights =
            self.distribution
                .actions_from_params(&mean, self.log_std, deterministic, rng)?;
        for w in weights.data_mut() {
            *w = rescale_weight(*w, amp);
        }
        Ok(weights)
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn projection_mut(&mut self) -> &mut P {
        &mut self.projection
    }

    pub fn distribution(&self) -> &SquashedDiagGaussian {
        &self.distribution
    }

    pub fn log_std(&self) -> f32 {
        self.log_std
    }

    pub fn compressed_dim(&self) -> usize {
        self.distribution.action_dim()
    }
}
