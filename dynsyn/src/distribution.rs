// src/distribution.rs
//
// Squashed diagonal-Gaussian head.
//
// Samples u = mu + eps * exp(log_std) with eps ~ N(0, 1) per dimension and
// returns tanh(u), so every output lies in (-1, 1). With `deterministic` the
// noise is dropped and the head returns tanh(mu). The reparameterised form
// keeps the sample a differentiable function of mu for an external trainer.
//
// log_std is a single fixed scalar shared by every dimension.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::error::{ensure_width, Result};
use crate::placement::ActionBatch;

/// Numerical guard for the tanh Jacobian and the atanh inverse.
pub const LOG_PROB_EPSILON: f32 = 1e-6;

const HALF_LN_2PI: f32 = 0.918_938_5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquashedDiagGaussian {
    action_dim: usize,
}

impl SquashedDiagGaussian {
    pub fn new(action_dim: usize) -> Self {
        Self { action_dim }
    }

    pub fn action_dim(&self) -> usize {
        self.action_dim
    }

    /// Mode when `deterministic`, otherwise a reparameterised sample.
    pub fn actions_from_params<R: Rng + ?Sized>(
        &self,
        mean: &ActionBatch,
        log_std: f32,
        deterministic: bool,
        rng: &mut R,
    ) -> Result<ActionBatch> {
        if deterministic {
            self.mode(mean)
        } else {
            self.sample(mean, log_std, rng)
        }
    }

    /// tanh(mu).
    pub fn mode(&self, mean: &ActionBatch) -> Result<ActionBatch> {
        ensure_width("distribution mean", self.action_dim, mean.width())?;
        Ok(ActionBatch::build_rows(
            mean.rows(),
            self.action_dim,
            mean.placement(),
            |i, out| {
                for (o, mu) in out.iter_mut().zip(mean.row(i)) {
                    *o = mu.tanh();
                }
            },
        ))
    }

    /// tanh(mu + eps * exp(log_std)).
    pub fn sample<R: Rng + ?Sized>(
        &self,
        mean: &ActionBatch,
        log_std: f32,
        rng: &mut R,
    ) -> Result<ActionBatch> {
        ensure_width("distribution mean", self.action_dim, mean.width())?;
        let std = log_std.exp();
        Ok(ActionBatch::build_rows(
            mean.rows(),
            self.action_dim,
            mean.placement(),
            |i, out| {
                for (o, mu) in out.iter_mut().zip(mean.row(i)) {
                    let eps: f32 = StandardNormal.sample(&mut *rng);
                    *o = (mu + eps * std).tanh();
                }
            },
        ))
    }

    /// Per-row log-density of squashed `actions` under `N(mean, exp(log_std)^2)`.
    ///
    /// Actions are clipped to `±(1 - LOG_PROB_EPSILON)` before `atanh`.
    pub fn log_prob(
        &self,
        mean: &ActionBatch,
        log_std: f32,
        actions: &ActionBatch,
    ) -> Result<Vec<f32>> {
        ensure_width("distribution mean", self.action_dim, mean.width())?;
        ensure_width("squashed actions", self.action_dim, actions.width())?;
        ensure_width("squashed action rows", mean.rows(), actions.rows())?;

        let var = (2.0 * log_std).exp();
        let bound = 1.0 - LOG_PROB_EPSILON;
        Ok((0..mean.rows())
            .map(|i| {
                mean.row(i)
                    .iter()
                    .zip(actions.row(i))
                    .map(|(mu, a)| {
                        let a = a.clamp(-bound, bound);
                        let u = a.atanh();
                        let gaussian = -(u - mu).powi(2) / (2.0 * var) - log_std - HALF_LN_2PI;
                        gaussian - (1.0 - a * a + LOG_PROB_EPSILON).ln()
                    })
                    .sum()
            })
            .collect())
    }

    /// No closed form once squashed.
    pub fn entropy(&self) -> Option<f32> {
        None
    }
}
