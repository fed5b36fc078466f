// src/action_wrappers.rs
//
// Post-layer actuator action wrappers and the name -> constructor registry
// used to build them from config.
//
// Built-ins:
// - activation_direct: a -> 1 / (1 + exp(-k (a - m))), k = 5, m = 0.5 by default;
//                      maps a policy action onto a muscle activation in (0, 1)
// - clip_action:       clamp every entry to [low, high]
//
// A name that is not registered is an error at build time.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{ConfigError, DynSynError, Result};
use crate::placement::ActionBatch;

pub trait ActionWrapper: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Transform one actuator-space action in place.
    fn apply(&self, action: &mut [f32]);

    fn apply_batch(&self, batch: &mut ActionBatch) {
        for i in 0..batch.rows() {
            self.apply(batch.row_mut(i));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationDirect {
    pub steepness: f32,
    pub midpoint: f32,
}

impl Default for ActivationDirect {
    fn default() -> Self {
        Self {
            steepness: 5.0,
            midpoint: 0.5,
        }
    }
}

impl ActionWrapper for ActivationDirect {
    fn name(&self) -> &str {
        "activation_direct"
    }

    fn apply(&self, action: &mut [f32]) {
        for a in action.iter_mut() {
            *a = 1.0 / (1.0 + (-self.steepness * (*a - self.midpoint)).exp());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipAction {
    pub low: f32,
    pub high: f32,
}

impl Default for ClipAction {
    fn default() -> Self {
        Self {
            low: -1.0,
            high: 1.0,
        }
    }
}

impl ActionWrapper for ClipAction {
    fn name(&self) -> &str {
        "clip_action"
    }

    fn apply(&self, action: &mut [f32]) {
        for a in action.iter_mut() {
            *a = a.clamp(self.low, self.high);
        }
    }
}

/// One entry of a config's wrapper list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrapperSpec {
    pub name: String,
    #[serde(default)]
    pub args: JsonValue,
}

impl WrapperSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: JsonValue::Null,
        }
    }

    pub fn with_args(mut self, args: JsonValue) -> Self {
        self.args = args;
        self
    }
}

pub type WrapperCtor = fn(&JsonValue) -> Result<Box<dyn ActionWrapper>>;

fn parse_args<T: DeserializeOwned + Default>(name: &str, args: &JsonValue) -> Result<T> {
    if args.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(args.clone()).map_err(|e| DynSynError::Parse {
        source: format!("arguments for wrapper '{}': {}", name, e),
    })
}

fn build_activation_direct(args: &JsonValue) -> Result<Box<dyn ActionWrapper>> {
    let w: ActivationDirect = parse_args("activation_direct", args)?;
    Ok(Box::new(w))
}

fn build_clip_action(args: &JsonValue) -> Result<Box<dyn ActionWrapper>> {
    let w: ClipAction = parse_args("clip_action", args)?;
    if w.low.is_nan() || w.high.is_nan() || w.low > w.high {
        return Err(ConfigError::Validation {
            field: "clip_action".to_string(),
            message: format!("low ({}) must not exceed high ({})", w.low, w.high),
        }
        .into());
    }
    Ok(Box::new(w))
}

/// Explicit registry of wrapper constructors.
#[derive(Clone, Default)]
pub struct WrapperRegistry {
    ctors: BTreeMap<String, WrapperCtor>,
}

impl WrapperRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("activation_direct", build_activation_direct);
        registry.register("clip_action", build_clip_action);
        registry
    }

    /// Register (or replace) a constructor.
    pub fn register(&mut self, name: &str, ctor: WrapperCtor) {
        self.ctors.insert(name.to_string(), ctor);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ctors.keys().map(|k| k.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ctors.contains_key(name)
    }

    pub fn build(&self, name: &str, args: &JsonValue) -> Result<Box<dyn ActionWrapper>> {
        let ctor = self
            .ctors
            .get(name)
            .ok_or_else(|| DynSynError::UnknownWrapper {
                name: name.to_string(),
            })?;
        ctor(args)
    }

    pub fn build_chain(&self, specs: &[WrapperSpec]) -> Result<WrapperChain> {
        let wrappers = specs
            .iter()
            .map(|s| self.build(&s.name, &s.args))
            .collect::<Result<Vec<_>>>()?;
        Ok(WrapperChain { wrappers })
    }
}

impl fmt::Debug for WrapperRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ctors.keys()).finish()
    }
}

/// Wrappers applied in declaration order.
#[derive(Debug, Default)]
pub struct WrapperChain {
    wrappers: Vec<Box<dyn ActionWrapper>>,
}

impl WrapperChain {
    pub fn len(&self) -> usize {
        self.wrappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.wrappers.iter().map(|w| w.name()).collect()
    }

    pub fn apply(&self, batch: &mut ActionBatch) {
        for w in &self.wrappers {
            w.apply_batch(batch);
        }
    }
}
