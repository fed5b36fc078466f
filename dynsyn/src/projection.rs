// src/projection.rs
//
// Learned affine projection from the policy's hidden representation to the
// per-follower weight logits.
//
// The layer only runs the projection forward. Its parameters are trained by
// an external optimizer, so they are plain data here: readable, replaceable,
// and serializable into checkpoints.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_width, DynSynError, Result};
use crate::placement::ActionBatch;

/// Forward-only projection `hidden -> logits`.
pub trait Projection {
    fn input_dim(&self) -> usize;
    fn output_dim(&self) -> usize;
    fn forward(&self, hidden: &ActionBatch) -> Result<ActionBatch>;
}

/// `y = W h + b`, with `W` stored row-major as `[output_dim, input_dim]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearProjection {
    input_dim: usize,
    output_dim: usize,
    weight: Vec<f32>,
    bias: Vec<f32>,
}

impl LinearProjection {
    /// Wrap explicit parameters.
    pub fn from_parameters(
        input_dim: usize,
        output_dim: usize,
        weight: Vec<f32>,
        bias: Vec<f32>,
    ) -> Result<Self> {
        ensure_width("projection weight", input_dim * output_dim, weight.len())?;
        ensure_width("projection bias", output_dim, bias.len())?;
        Ok(Self {
            input_dim,
            output_dim,
            weight,
            bias,
        })
    }

    /// Uniform init in `[-1/sqrt(in), 1/sqrt(in)]` for both weight and bias,
    /// deterministic in `seed`.
    pub fn seeded(input_dim: usize, output_dim: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let bound = if input_dim > 0 {
            1.0 / (input_dim as f32).sqrt()
        } else {
            0.0
        };
        let mut draw = |n: usize| -> Vec<f32> {
            (0..n)
                .map(|_| {
                    if bound > 0.0 {
                        rng.gen_range(-bound..bound)
                    } else {
                        0.0
                    }
                })
                .collect()
        };
        let weight = draw(input_dim * output_dim);
        let bias = draw(output_dim);
        Self {
            input_dim,
            output_dim,
            weight,
            bias,
        }
    }

    /// All-zero parameters: every logit is 0 regardless of input.
    pub fn zeros(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
            weight: vec![0.0; input_dim * output_dim],
            bias: vec![0.0; output_dim],
        }
    }

    pub fn weight(&self) -> &[f32] {
        &self.weight
    }

    pub fn bias(&self) -> &[f32] {
        &self.bias
    }

    /// Replace the parameters after an external optimizer step.
    pub fn set_parameters(&mut self, weight: Vec<f32>, bias: Vec<f32>) -> Result<()> {
        ensure_width("projection weight", self.input_dim * self.output_dim, weight.len())?;
        ensure_width("projection bias", self.output_dim, bias.len())?;
        self.weight = weight;
        self.bias = bias;
        Ok(())
    }

    /// Check the parameter buffers against the declared dimensions.
    ///
    /// Needed after deserialization, where the fields are taken on trust.
    pub fn validate(&self) -> Result<()> {
        ensure_width("projection weight", self.input_dim * self.output_dim, self.weight.len())?;
        ensure_width("projection bias", self.output_dim, self.bias.len())?;
        if self
            .weight
            .iter()
            .chain(self.bias.iter())
            .any(|v| !v.is_finite())
        {
            return Err(DynSynError::Parse {
                source: "projection parameters contain NaN or inf".to_string(),
            });
        }
        Ok(())
    }
}

impl Projection for LinearProjection {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn output_dim(&self) -> usize {
        self.output_dim
    }

    fn forward(&self, hidden: &ActionBatch) -> Result<ActionBatch> {
        ensure_width("hidden representation", self.input_dim, hidden.width())?;
        let (k, n) = (self.input_dim, self.output_dim);
        Ok(ActionBatch::build_rows(
            hidden.rows(),
            n,
            hidden.placement(),
            |i, out| {
                let h = hidden.row(i);
                for (j, o) in out.iter_mut().enumerate() {
                    let w = &self.weight[j * k..(j + 1) * k];
                    *o = self.bias[j] + w.iter().zip(h).map(|(a, b)| a * b).sum::<f32>();
                }
            },
        ))
    }
}
