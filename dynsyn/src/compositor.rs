// src/compositor.rs
//
// Applies follower weights to an expanded actuator-space action.
//
// Only columns listed in weight_indices are scaled, in the order the index
// enumerated them; leader and singleton columns pass through untouched.

use crate::error::{ensure_width, Result};
use crate::groups::GroupIndex;
use crate::placement::ActionBatch;

pub struct Compositor;

impl Compositor {
    /// `expanded[:, weight_indices[k]] *= weights[:, k]`, in place.
    pub fn compose(
        index: &GroupIndex,
        expanded: &mut ActionBatch,
        weights: &ActionBatch,
    ) -> Result<()> {
        ensure_width("expanded action", index.actuator_count, expanded.width())?;
        ensure_width("follower weights", index.compressed_dim, weights.width())?;
        ensure_width("follower weight rows", expanded.rows(), weights.rows())?;

        for i in 0..expanded.rows() {
            let w = weights.row(i);
            let row = expanded.row_mut(i);
            for (&actuator, &weight) in index.weight_indices.iter().zip(w) {
                row[actuator] *= weight;
            }
        }
        Ok(())
    }

    /// Clamp every entry to `[-1, 1]`; returns how many entries changed.
    pub fn clamp_unit(actions: &mut ActionBatch) -> usize {
        let mut changed = 0;
        for v in actions.data_mut() {
            let clamped = v.clamp(-1.0, 1.0);
            if clamped != *v {
                changed += 1;
                *v = clamped;
            }
        }
        changed
    }
}
