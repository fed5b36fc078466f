// src/trace.rs
//
// Per-episode action traces.
//
// An EpisodeTrace records, for every environment step, the compressed
// (per-group) action the policy emitted, the actuator action actually sent
// to the environment and the amplitude in force. TraceWriter persists one
// trace as
//   {dir}/{prefix}_episode_{i}_actions.jsonl   one StepRecord per line
//   {dir}/{prefix}_episode_{i}_summary.json    TraceSummary, pretty JSON

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ensure_width, DynSynError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub compressed: Vec<f32>,
    pub actions: Vec<f32>,
    pub amp: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub steps: usize,
    pub group_count: usize,
    pub actuator_count: usize,
    pub amp_first: Option<f32>,
    pub amp_last: Option<f32>,
    /// Mean |a| over every actuator entry of the episode.
    pub mean_abs_action: f32,
    /// Per-actuator mean action.
    pub actuator_means: Vec<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct EpisodeTrace {
    group_count: usize,
    actuator_count: usize,
    steps: Vec<StepRecord>,
}

impl EpisodeTrace {
    pub fn new(group_count: usize, actuator_count: usize) -> Self {
        Self {
            group_count,
            actuator_count,
            steps: Vec::new(),
        }
    }

    pub fn record_step(&mut self, compressed: &[f32], actions: &[f32], amp: f32) -> Result<()> {
        ensure_width("traced compressed action", self.group_count, compressed.len())?;
        ensure_width("traced actuator action", self.actuator_count, actions.len())?;
        self.steps.push(StepRecord {
            step: self.steps.len(),
            compressed: compressed.to_vec(),
            actions: actions.to_vec(),
            amp,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn summary(&self) -> TraceSummary {
        let mut actuator_means = vec![0.0f64; self.actuator_count];
        let mut abs_sum = 0.0f64;
        for s in &self.steps {
            for (mean, &a) in actuator_means.iter_mut().zip(&s.actions) {
                *mean += a as f64;
                abs_sum += (a as f64).abs();
            }
        }
        let n = self.steps.len();
        let (mean_abs_action, actuator_means) = if n == 0 {
            (0.0, vec![0.0; self.actuator_count])
        } else {
            let entries = (n * self.actuator_count).max(1) as f64;
            (
                (abs_sum / entries) as f32,
                actuator_means
                    .into_iter()
                    .map(|m| (m / n as f64) as f32)
                    .collect(),
            )
        };
        TraceSummary {
            steps: n,
            group_count: self.group_count,
            actuator_count: self.actuator_count,
            amp_first: self.steps.first().map(|s| s.amp),
            amp_last: self.steps.last().map(|s| s.amp),
            mean_abs_action,
            actuator_means,
        }
    }
}

/// Writes episode traces into one output directory.
pub struct TraceWriter {
    output_dir: PathBuf,
    prefix: String,
}

impl TraceWriter {
    pub fn new<P: Into<PathBuf>>(output_dir: P, prefix: &str) -> Self {
        Self {
            output_dir: output_dir.into(),
            prefix: prefix.to_string(),
        }
    }

    pub fn actions_path(&self, episode: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}_episode_{}_actions.jsonl", self.prefix, episode))
    }

    pub fn summary_path(&self, episode: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}_episode_{}_summary.json", self.prefix, episode))
    }

    pub fn write(&self, episode: usize, trace: &EpisodeTrace) -> Result<()> {
        fs::create_dir_all(&self.output_dir).map_err(|e| io_error(&self.output_dir, e))?;

        let actions_path = self.actions_path(episode);
        write_jsonl(&actions_path, trace.steps()).map_err(|e| io_error(&actions_path, e))?;

        let summary_path = self.summary_path(episode);
        let summary = serde_json::to_string_pretty(&trace.summary()).map_err(|e| {
            DynSynError::Parse {
                source: e.to_string(),
            }
        })?;
        fs::write(&summary_path, summary).map_err(|e| io_error(&summary_path, e))
    }
}

fn write_jsonl(path: &Path, steps: &[StepRecord]) -> io::Result<()> {
    let mut file = BufWriter::new(fs::File::create(path)?);
    for record in steps {
        let line = serde_json::to_string(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(file, "{}", line)?;
    }
    file.flush()
}

fn io_error(path: &Path, e: io::Error) -> DynSynError {
    DynSynError::Io {
        path: path.display().to_string(),
        source: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_summarises() {
        let mut trace = EpisodeTrace::new(2, 4);
        trace.record_step(&[0.5, -0.5], &[0.5, -0.5, -0.5, -0.5], 0.0).unwrap();
        trace.record_step(&[1.0, 0.0], &[1.0, 0.0, 0.0, 0.0], 0.02).unwrap();
        assert_eq!(trace.len(), 2);

        let s = trace.summary();
        assert_eq!(s.steps, 2);
        assert_eq!(s.amp_first, Some(0.0));
        assert_eq!(s.amp_last, Some(0.02));
        assert!((s.mean_abs_action - 3.0 / 8.0).abs() < 1e-6);
        assert!((s.actuator_means[0] - 0.75).abs() < 1e-6);
        assert!((s.actuator_means[3] + 0.25).abs() < 1e-6);
    }

    #[test]
    fn rejects_wrong_widths() {
        let mut trace = EpisodeTrace::new(2, 4);
        assert!(trace.record_step(&[0.0], &[0.0; 4], 0.0).is_err());
        assert!(trace.record_step(&[0.0; 2], &[0.0; 3], 0.0).is_err());
        assert!(trace.is_empty());
    }

    #[test]
    fn empty_summary() {
        let s = EpisodeTrace::new(1, 3).summary();
        assert_eq!(s.steps, 0);
        assert_eq!(s.amp_first, None);
        assert_eq!(s.actuator_means, vec![0.0; 3]);
    }

    #[test]
    fn writer_creates_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("traces");
        let writer = TraceWriter::new(&out, "eval");

        let mut trace = EpisodeTrace::new(1, 2);
        for i in 0..3 {
            trace.record_step(&[i as f32], &[i as f32, 0.0], 0.01).unwrap();
        }
        writer.write(4, &trace).unwrap();

        let actions = std::fs::read_to_string(out.join("eval_episode_4_actions.jsonl")).unwrap();
        let records: Vec<StepRecord> = actions
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records, trace.steps());

        let summary: TraceSummary = serde_json::from_str(
            &std::fs::read_to_string(out.join("eval_episode_4_summary.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(summary, trace.summary());
    }
}
