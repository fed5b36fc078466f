// src/checkpoint.rs
//
// JSON checkpoints of a configured layer.
//
// A checkpoint stores the muscle groups together with the index tables that
// were derived from them, plus everything needed to rebuild the layer
// (noise scale, amplitude, variant, projection parameters). On load the
// tables are rebuilt from the groups and compared field by field with the
// stored ones, so a checkpoint written against different index semantics
// fails loudly instead of silently mis-routing actions.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DynSynError, Result};
use crate::groups::{GroupIndex, MuscleGroupSpec};
use crate::layer::{DynSynLayer, LayerVariant, PolicyLayer};
use crate::projection::LinearProjection;

pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerCheckpoint {
    pub version: u32,
    pub muscle_groups: MuscleGroupSpec,
    pub index: GroupIndex,
    /// Hex SHA-256 of `index` at save time.
    pub tables_sha256: String,
    pub log_std: f32,
    pub weight_amp: f32,
    pub variant: LayerVariant,
    pub projection: LinearProjection,
}

impl LayerCheckpoint {
    pub fn from_layer(layer: &PolicyLayer) -> Self {
        let base = layer.base();
        let index = base.index();
        Self {
            version: CHECKPOINT_VERSION,
            muscle_groups: base.spec().clone(),
            tables_sha256: index.fingerprint(),
            index: (*index).clone(),
            log_std: base.log_std(),
            weight_amp: base.weight_amp(),
            variant: layer.variant(),
            projection: base.projection().clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| DynSynError::Parse {
            source: e.to_string(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| DynSynError::Parse {
            source: e.to_string(),
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| io_error(path, e))?;
            }
        }
        fs::write(path, json).map_err(|e| io_error(path, e))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
        Self::from_json(&contents)
    }

    /// Rebuild the layer, verifying the stored tables against fresh ones.
    pub fn into_layer(self) -> Result<PolicyLayer> {
        if self.version != CHECKPOINT_VERSION {
            return Err(DynSynError::CheckpointMismatch { field: "version" });
        }
        let rebuilt = self.muscle_groups.build()?;
        let stored = &self.index;

        let checks: [(&'static str, bool); 7] = [
            ("actuator_count", rebuilt.actuator_count == stored.actuator_count),
            ("group_count", rebuilt.group_count == stored.group_count),
            ("compressed_dim", rebuilt.compressed_dim == stored.compressed_dim),
            ("group_sizes", rebuilt.group_sizes == stored.group_sizes),
            ("weight_indices", rebuilt.weight_indices == stored.weight_indices),
            ("non_weight_indices", rebuilt.non_weight_indices == stored.non_weight_indices),
            ("placement_table", rebuilt.placement_table == stored.placement_table),
        ];
        if let Some(&(field, _)) = checks.iter().find(|(_, ok)| !*ok) {
            return Err(DynSynError::CheckpointMismatch { field });
        }
        if rebuilt.fingerprint() != self.tables_sha256 {
            return Err(DynSynError::CheckpointMismatch {
                field: "tables_sha256",
            });
        }

        self.projection.validate()?;
        let base = DynSynLayer::new(
            self.muscle_groups,
            self.projection,
            self.log_std,
            self.weight_amp,
        )?;
        Ok(PolicyLayer::from_variant(self.variant, base))
    }
}

fn io_error(path: &Path, e: std::io::Error) -> DynSynError {
    DynSynError::Io {
        path: path.display().to_string(),
        source: e.to_string(),
    }
}
