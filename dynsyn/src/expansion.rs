// src/expansion.rs
//
// Broadcast of a compressed per-group action into actuator space, and the
// leader projection that takes an actuator-space action back to per-group
// width.
//
// expand:   x[g] is repeated group_sizes[g] times (canonical, group-major
//           order), then gathered through placement_table so column i is
//           actuator i.
// collapse: keep only the leader column of each group, in group order.
//           Followers are dropped, so this inverts `expand` only on leaders.

use crate::error::{ensure_width, Result};
use crate::groups::GroupIndex;
use crate::placement::ActionBatch;

pub struct ExpansionEngine;

impl ExpansionEngine {
    /// `[rows, G] -> [rows, M]`.
    pub fn expand(index: &GroupIndex, x: &ActionBatch) -> Result<ActionBatch> {
        ensure_width("compressed action", index.group_count, x.width())?;

        let mut canonical = Vec::with_capacity(index.actuator_count);
        Ok(ActionBatch::build_rows(
            x.rows(),
            index.actuator_count,
            x.placement(),
            |i, out| {
                canonical.clear();
                for (&value, &size) in x.row(i).iter().zip(&index.group_sizes) {
                    canonical.extend(std::iter::repeat(value).take(size));
                }
                for (o, &pos) in out.iter_mut().zip(&index.placement_table) {
                    *o = canonical[pos];
                }
            },
        ))
    }

    /// `[rows, M] -> [rows, G]`, leader columns only.
    pub fn collapse(index: &GroupIndex, actions: &ActionBatch) -> Result<ActionBatch> {
        ensure_width("actuator action", index.actuator_count, actions.width())?;
        Ok(ActionBatch::build_rows(
            actions.rows(),
            index.group_count,
            actions.placement(),
            |i, out| {
                let row = actions.row(i);
                for (o, &leader) in out.iter_mut().zip(&index.non_weight_indices) {
                    *o = row[leader];
                }
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::MuscleGroupSpec;

    fn index(groups: Vec<Vec<usize>>) -> GroupIndex {
        MuscleGroupSpec::new(groups).build().unwrap()
    }

    #[test]
    fn broadcasts_group_values() {
        let idx = index(vec![vec![0], vec![1, 2, 3]]);
        let x = ActionBatch::from_row(vec![0.25, -0.5]);
        let y = ExpansionEngine::expand(&idx, &x).unwrap();
        assert_eq!(y.data(), &[0.25, -0.5, -0.5, -0.5]);
    }

    #[test]
    fn places_values_at_declared_actuators() {
        // Group 0 drives actuators 3 and 0, group 1 drives 2, group 2 drives 1 and 4.
        let idx = index(vec![vec![3, 0], vec![2], vec![1, 4]]);
        let x = ActionBatch::from_row(vec![10.0, 20.0, 30.0]);
        let y = ExpansionEngine::expand(&idx, &x).unwrap();
        assert_eq!(y.data(), &[10.0, 30.0, 20.0, 10.0, 30.0]);
    }

    #[test]
    fn expands_every_row() {
        let idx = index(vec![vec![0, 1], vec![2]]);
        let x = ActionBatch::new(vec![1.0, 2.0, 3.0, 4.0], 2).unwrap();
        let y = ExpansionEngine::expand(&idx, &x).unwrap();
        assert_eq!(y.to_rows(), vec![vec![1.0, 1.0, 2.0], vec![3.0, 3.0, 4.0]]);
    }

    #[test]
    fn collapse_recovers_compressed_action() {
        let idx = index(vec![vec![3, 0], vec![2], vec![1, 4]]);
        let x = ActionBatch::new(vec![0.1, 0.2, 0.3, -0.4, -0.5, -0.6], 3).unwrap();
        let y = ExpansionEngine::expand(&idx, &x).unwrap();
        let back = ExpansionEngine::collapse(&idx, &y).unwrap();
        assert_eq!(back, x);
    }

    #[test]
    fn rejects_wrong_widths() {
        let idx = index(vec![vec![0], vec![1, 2]]);
        assert!(ExpansionEngine::expand(&idx, &ActionBatch::from_row(vec![0.0; 3])).is_err());
        assert!(ExpansionEngine::collapse(&idx, &ActionBatch::from_row(vec![0.0; 2])).is_err());
    }
}
