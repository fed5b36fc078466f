// dynsyn_env/src/lib.rs
//
// Python bindings for the dynsyn action-expansion layer.
//
// Exposes one class, DynSynLayer, to a Python training loop:
// - forward(x, hidden, deterministic) -> actuator actions
// - revert(actions) -> per-group actions (revert variant only)
// - update_dynsyn_weight_amp(amp), called by the curriculum controller
// - index-table properties and checkpoint save/load
//
// Batches cross the boundary as lists of rows. The sampling RNG lives in the
// Python-side object and is seeded explicitly, so rollouts reproduce.

use pyo3::exceptions::{PyIOError, PyNotImplementedError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use dynsyn::{
    ActionBatch, DynSynError, LayerCheckpoint, LayerConfig, LayerVariant, PolicyLayer,
    CHECKPOINT_VERSION,
};

fn to_py_err(e: DynSynError) -> PyErr {
    match e {
        DynSynError::Io { .. } => PyIOError::new_err(e.to_string()),
        DynSynError::Unsupported { .. } => PyNotImplementedError::new_err(e.to_string()),
        _ => PyValueError::new_err(e.to_string()),
    }
}

fn batch(rows: &[Vec<f32>]) -> PyResult<ActionBatch> {
    ActionBatch::from_rows(rows).map_err(to_py_err)
}

/// Synergy-weighted action-expansion layer.
#[pyclass(name = "DynSynLayer")]
pub struct PyDynSynLayer {
    inner: PolicyLayer,
    rng: ChaCha8Rng,
}

impl PyDynSynLayer {
    fn wrap(inner: PolicyLayer, seed: u64) -> Self {
        Self {
            inner,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

#[pymethods]
impl PyDynSynLayer {
    /// Create a layer.
    ///
    /// Args:
    ///     muscle_groups: List[List[int]] partition of the actuator indices
    ///     hidden_dim: width of the hidden representation
    ///     log_std: fixed log std of the weight noise (default: 0.0)
    ///     initial_weight_amp: starting curriculum amplitude (default: 0.0)
    ///     variant: "base", "bounded"/"sac" or "revert"/"ppo" (default: "base")
    ///     seed: seeds both the projection init and the sampling RNG (default: 0)
    #[new]
    #[pyo3(signature = (muscle_groups, hidden_dim, log_std=0.0, initial_weight_amp=0.0, variant="base", seed=0))]
    fn new(
        muscle_groups: Vec<Vec<usize>>,
        hidden_dim: usize,
        log_std: f32,
        initial_weight_amp: f32,
        variant: &str,
        seed: u64,
    ) -> PyResult<Self> {
        let variant = LayerVariant::parse(variant).ok_or_else(|| {
            PyValueError::new_err(format!(
                "Unknown variant: {}. Use 'base', 'bounded' (sac) or 'revert' (ppo)",
                variant
            ))
        })?;
        let mut cfg = LayerConfig::new(muscle_groups, hidden_dim)
            .with_log_std(log_std)
            .with_variant(variant)
            .with_seed(seed);
        cfg.initial_weight_amp = initial_weight_amp;
        let inner = cfg.build_layer().map_err(to_py_err)?;
        Ok(Self::wrap(inner, seed))
    }

    /// Build from a YAML layer config (DYNSYN_* env overrides applied).
    #[staticmethod]
    fn from_config(path: &str) -> PyResult<Self> {
        let cfg = LayerConfig::from_yaml_file(path)
            .map_err(to_py_err)?
            .with_env_overrides();
        let inner = cfg.build_layer().map_err(to_py_err)?;
        Ok(Self::wrap(inner, cfg.seed))
    }

    /// Restore a layer saved with `save_checkpoint`.
    #[staticmethod]
    #[pyo3(signature = (path, seed=0))]
    fn load_checkpoint(path: &str, seed: u64) -> PyResult<Self> {
        let inner = LayerCheckpoint::load(path)
            .and_then(LayerCheckpoint::into_layer)
            .map_err(to_py_err)?;
        Ok(Self::wrap(inner, seed))
    }

    fn save_checkpoint(&self, path: &str) -> PyResult<()> {
        LayerCheckpoint::from_layer(&self.inner)
            .save(path)
            .map_err(to_py_err)
    }

    /// Reseed the sampling RNG.
    fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    /// Evaluate the layer.
    ///
    /// Args:
    ///     x: List[List[float]], rows of width group_count
    ///     hidden: List[List[float]], rows of width hidden_dim
    ///     deterministic: use the distribution mode (default: False)
    ///
    /// Returns:
    ///     List[List[float]] rows of width actuator_count
    #[pyo3(signature = (x, hidden, deterministic=false))]
    fn forward(
        &mut self,
        x: Vec<Vec<f32>>,
        hidden: Vec<Vec<f32>>,
        deterministic: bool,
    ) -> PyResult<Vec<Vec<f32>>> {
        let x = batch(&x)?;
        let hidden = batch(&hidden)?;
        self.inner
            .forward(&x, &hidden, deterministic, &mut self.rng)
            .map(|a| a.to_rows())
            .map_err(to_py_err)
    }

    /// Like `forward`, also returning the per-call stats as a dict.
    #[pyo3(signature = (x, hidden, deterministic=false))]
    fn forward_with_stats(
        &mut self,
        py: Python<'_>,
        x: Vec<Vec<f32>>,
        hidden: Vec<Vec<f32>>,
        deterministic: bool,
    ) -> PyResult<(Vec<Vec<f32>>, Py<PyDict>)> {
        let x = batch(&x)?;
        let hidden = batch(&hidden)?;
        let (actions, stats) = self
            .inner
            .forward_with_stats(&x, &hidden, deterministic, &mut self.rng)
            .map_err(to_py_err)?;

        let dict = PyDict::new_bound(py);
        dict.set_item("call_index", stats.call_index)?;
        dict.set_item("rows", stats.rows)?;
        dict.set_item("amp", stats.amp)?;
        dict.set_item("deterministic", stats.deterministic)?;
        dict.set_item("weight_min", stats.weight_min)?;
        dict.set_item("weight_max", stats.weight_max)?;
        dict.set_item("weight_mean", stats.weight_mean)?;
        dict.set_item("clamped", stats.clamped)?;
        dict.set_item("placement", stats.placement.to_string())?;
        Ok((actions.to_rows(), dict.into()))
    }

    /// Broadcast per-group actions to actuators without weighting.
    fn expand(&self, x: Vec<Vec<f32>>) -> PyResult<Vec<Vec<f32>>> {
        let x = batch(&x)?;
        self.inner
            .base()
            .expand(&x)
            .map(|a| a.to_rows())
            .map_err(to_py_err)
    }

    /// Leader/singleton columns of actuator actions (revert variant only).
    fn revert(&self, actions: Vec<Vec<f32>>) -> PyResult<Vec<Vec<f32>>> {
        let actions = batch(&actions)?;
        self.inner
            .revert(&actions)
            .map(|a| a.to_rows())
            .map_err(to_py_err)
    }

    /// Set the curriculum amplitude (finite, >= 0).
    fn update_dynsyn_weight_amp(&self, amp: f32) -> PyResult<()> {
        self.inner.update_weight_amp(amp).map_err(to_py_err)
    }

    #[getter]
    fn weight_amp(&self) -> f32 {
        self.inner.weight_amp()
    }

    #[getter]
    fn log_std(&self) -> f32 {
        self.inner.base().log_std()
    }

    #[getter]
    fn variant(&self) -> &'static str {
        self.inner.variant().as_str()
    }

    #[getter]
    fn actuator_count(&self) -> usize {
        self.inner.base().actuator_count()
    }

    #[getter]
    fn group_count(&self) -> usize {
        self.inner.base().group_count()
    }

    #[getter]
    fn compressed_dim(&self) -> usize {
        self.inner.base().compressed_dim()
    }

    #[getter]
    fn hidden_dim(&self) -> usize {
        self.inner.base().hidden_dim()
    }

    #[getter]
    fn weight_indices(&self) -> Vec<usize> {
        self.inner.base().index().weight_indices.clone()
    }

    #[getter]
    fn non_weight_indices(&self) -> Vec<usize> {
        self.inner.base().index().non_weight_indices.clone()
    }

    #[getter]
    fn placement_table(&self) -> Vec<usize> {
        self.inner.base().index().placement_table.clone()
    }

    /// Hex SHA-256 of the index tables.
    #[getter]
    fn tables_sha256(&self) -> String {
        self.inner.base().index().fingerprint()
    }

    /// Projection parameters as (weight, bias), weight row-major [C, hidden_dim].
    fn projection_parameters(&self) -> (Vec<f32>, Vec<f32>) {
        let p = self.inner.base().projection();
        (p.weight().to_vec(), p.bias().to_vec())
    }

    /// Replace the projection parameters after an optimizer step.
    fn set_projection_parameters(&mut self, weight: Vec<f32>, bias: Vec<f32>) -> PyResult<()> {
        self.inner
            .base_mut()
            .projection_mut()
            .set_parameters(weight, bias)
            .map_err(to_py_err)
    }

    fn __repr__(&self) -> String {
        format!(
            "DynSynLayer(variant={}, actuators={}, groups={}, amp={})",
            self.inner.variant(),
            self.inner.base().actuator_count(),
            self.inner.base().group_count(),
            self.inner.weight_amp()
        )
    }
}

/// Checkpoint format version written by `save_checkpoint`.
#[pyfunction]
fn checkpoint_version() -> u32 {
    CHECKPOINT_VERSION
}

/// Python module definition.
#[pymodule]
fn dynsyn_env(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyDynSynLayer>()?;
    m.add_function(wrap_pyfunction!(checkpoint_version, m)?)?;
    Ok(())
}
