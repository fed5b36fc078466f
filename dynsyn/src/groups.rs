// src/groups.rs
//
// Muscle-group specification and the static index tables derived from it.
//
// A spec is an ordered list of groups, each an ordered list of actuator
// indices. The first index of a group is its leader; the rest are followers.
// The union of all groups must be exactly {0, ..., M-1} with no repeats,
// otherwise construction fails with a ConfigError.
//
// Derived tables (immutable once built):
// - group_sizes:        broadcast repeat count per group
// - weight_indices:     follower actuators, groups in spec order, followers in spec order
// - non_weight_indices: leader actuator of each group, in group order
// - placement_table:    placement_table[actuator] = position of that actuator in
//                       the canonical flattened (group-major) order

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ConfigError;

/// Ordered muscle groups, as declared by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MuscleGroupSpec {
    groups: Vec<Vec<usize>>,
}

impl MuscleGroupSpec {
    pub fn new(groups: Vec<Vec<usize>>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    /// Validate the partition and derive every index table.
    pub fn build(&self) -> Result<GroupIndex, ConfigError> {
        if self.groups.is_empty() {
            return Err(ConfigError::EmptySpec);
        }
        if let Some(group) = self.groups.iter().position(|g| g.is_empty()) {
            return Err(ConfigError::EmptyGroup { group });
        }

        let entry_count: usize = self.groups.iter().map(Vec::len).sum();
        let max_index = self
            .groups
            .iter()
            .flat_map(|g| g.iter().copied())
            .max()
            .unwrap_or(0);
        // A partition of [0, M) lists exactly M entries. A larger index means
        // a gap below it; report that before sizing any table from it.
        if max_index >= entry_count {
            let mut listed: Vec<usize> = self.groups.iter().flatten().copied().collect();
            listed.sort_unstable();
            listed.dedup();
            let index = listed
                .iter()
                .enumerate()
                .find(|(i, &a)| *i != a)
                .map_or(listed.len(), |(i, _)| i);
            return Err(ConfigError::MissingIndex {
                index,
                actuator_count: max_index.saturating_add(1),
            });
        }
        let actuator_count = max_index + 1;
        let group_count = self.groups.len();

        // Owner group of each actuator; catches overlaps and gaps in one pass.
        let mut owner: Vec<Option<usize>> = vec![None; actuator_count];
        for (g, group) in self.groups.iter().enumerate() {
            for &idx in group {
                if let Some(first_group) = owner[idx] {
                    return Err(ConfigError::DuplicateIndex {
                        index: idx,
                        first_group,
                        second_group: g,
                    });
                }
                owner[idx] = Some(g);
            }
        }
        if let Some(index) = owner.iter().position(|o| o.is_none()) {
            return Err(ConfigError::MissingIndex {
                index,
                actuator_count,
            });
        }

        let group_sizes: Vec<usize> = self.groups.iter().map(|g| g.len()).collect();
        let non_weight_indices: Vec<usize> = self.groups.iter().map(|g| g[0]).collect();
        let weight_indices: Vec<usize> = self
            .groups
            .iter()
            .flat_map(|g| g[1..].iter().copied())
            .collect();

        let mut placement_table = vec![0usize; actuator_count];
        for (canonical, &actuator) in self.groups.iter().flatten().enumerate() {
            placement_table[actuator] = canonical;
        }

        let compressed_dim = actuator_count - group_count;
        debug_assert_eq!(compressed_dim, weight_indices.len());

        Ok(GroupIndex {
            actuator_count,
            group_count,
            compressed_dim,
            group_sizes,
            weight_indices,
            non_weight_indices,
            placement_table,
        })
    }
}

impl From<Vec<Vec<usize>>> for MuscleGroupSpec {
    fn from(groups: Vec<Vec<usize>>) -> Self {
        Self::new(groups)
    }
}

/// Index tables derived from a valid [`MuscleGroupSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupIndex {
    /// M: number of actuators.
    pub actuator_count: usize,
    /// G: number of groups (width of the compressed action).
    pub group_count: usize,
    /// C = M - G: number of follower actuators (width of the weight vector).
    pub compressed_dim: usize,
    pub group_sizes: Vec<usize>,
    pub weight_indices: Vec<usize>,
    pub non_weight_indices: Vec<usize>,
    pub placement_table: Vec<usize>,
}

impl GroupIndex {
    /// True when expansion needs no reordering.
    pub fn is_identity_placement(&self) -> bool {
        self.placement_table
            .iter()
            .enumerate()
            .all(|(actuator, &canonical)| actuator == canonical)
    }

    /// Hex SHA-256 of the canonical JSON encoding of the tables.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}
