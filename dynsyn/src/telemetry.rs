// src/telemetry.rs
//
// Per-call layer telemetry.
//
// - ForwardStats: summary of one forward evaluation (amp used, weight spread,
//   how many entries the bounded variant clamped, placement)
// - LayerTelemetry: opt-in JSONL sink for ForwardStats and amp updates
//
// The sink is disabled unless enabled explicitly or via
//   DYNSYN_TELEMETRY_MODE=jsonl  and  DYNSYN_TELEMETRY_PATH=<file>
// An I/O failure disables the sink; it never fails the caller.

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::placement::{ActionBatch, Placement};

/// Summary of one forward evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardStats {
    /// Monotonic per-layer call counter.
    pub call_index: u64,
    pub rows: usize,
    pub actuator_count: usize,
    /// Amplitude snapshot used for this call.
    pub amp: f32,
    pub deterministic: bool,
    /// None when the layer has no follower actuators.
    pub weight_min: Option<f32>,
    pub weight_max: Option<f32>,
    pub weight_mean: Option<f32>,
    /// Entries changed by the bounded variant's clamp (0 otherwise).
    pub clamped: usize,
    pub placement: Placement,
}

impl ForwardStats {
    pub(crate) fn from_weights(
        call_index: u64,
        amp: f32,
        deterministic: bool,
        actuator_count: usize,
        weights: &ActionBatch,
    ) -> Self {
        let data = weights.data();
        let (weight_min, weight_max, weight_mean) = if data.is_empty() {
            (None, None, None)
        } else {
            let min = data.iter().copied().fold(f32::INFINITY, f32::min);
            let max = data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let mean = data.iter().map(|&v| v as f64).sum::<f64>() / data.len() as f64;
            (Some(min), Some(max), Some(mean as f32))
        };
        Self {
            call_index,
            rows: weights.rows(),
            actuator_count,
            amp,
            deterministic,
            weight_min,
            weight_max,
            weight_mean,
            clamped: 0,
            placement: weights.placement(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum TelemetryRecord<'a> {
    Forward {
        #[serde(flatten)]
        stats: &'a ForwardStats,
    },
    AmpUpdate {
        step: u64,
        previous: f32,
        amp: f32,
    },
}

/// JSONL sink for layer telemetry.
pub struct LayerTelemetry {
    enabled: bool,
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    records_written: u64,
}

impl LayerTelemetry {
    /// Disabled sink.
    pub fn new() -> Self {
        Self {
            enabled: false,
            path: None,
            writer: None,
            records_written: 0,
        }
    }

    pub fn from_env() -> Self {
        let enabled = env::var("DYNSYN_TELEMETRY_MODE")
            .map(|s| s.to_lowercase() == "jsonl")
            .unwrap_or(false);
        let path = env::var("DYNSYN_TELEMETRY_PATH").ok().map(PathBuf::from);
        Self {
            enabled: enabled && path.is_some(),
            path,
            writer: None,
            records_written: 0,
        }
    }

    pub fn enable(path: PathBuf) -> Self {
        Self {
            enabled: true,
            path: Some(path),
            writer: None,
            records_written: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    fn ensure_writer(&mut self) -> Option<&mut BufWriter<File>> {
        if !self.enabled {
            return None;
        }
        if self.writer.is_none() {
            let opened = self.path.as_ref().map(|path| {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                OpenOptions::new().create(true).append(true).open(path)
            });
            match opened {
                Some(Ok(file)) => self.writer = Some(BufWriter::new(file)),
                Some(Err(e)) => {
                    eprintln!("[telemetry] disabling sink: {}", e);
                    self.enabled = false;
                    return None;
                }
                None => {
                    self.enabled = false;
                    return None;
                }
            }
        }
        self.writer.as_mut()
    }

    fn write_json(&mut self, value: &JsonValue) {
        let Some(writer) = self.ensure_writer() else {
            return;
        };
        let line = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(_) => return,
        };
        if writeln!(writer, "{}", line).is_err() {
            self.enabled = false;
            self.writer = None;
            return;
        }
        self.records_written += 1;
    }

    pub fn log_forward(&mut self, stats: &ForwardStats) {
        let value = serde_json::to_value(TelemetryRecord::Forward { stats }).unwrap_or_default();
        self.write_json(&value);
    }

    pub fn log_amp_update(&mut self, step: u64, previous: f32, amp: f32) {
        let value = serde_json::to_value(TelemetryRecord::AmpUpdate {
            step,
            previous,
            amp,
        })
        .unwrap_or_default();
        self.write_json(&value);
    }

    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

impl Default for LayerTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LayerTelemetry {
    fn drop(&mut self) {
        self.flush();
    }
}
