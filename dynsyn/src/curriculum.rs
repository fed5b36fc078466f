// src/curriculum.rs
//
// Curriculum amplitude for the follower weights.
//
// - CurriculumAmplitude: the layer-owned `amp` scalar. Stored as f32 bits in
//   an AtomicU32 so evaluations always read a whole value, even if an update
//   lands while a layer is shared across threads. One writer (the external
//   schedule controller), many readers.
// - CurriculumSchedule: deterministic amp(step) helper for that controller.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{DynSynError, Result};

/// Bound on how far a follower weight may deviate from 1.
#[derive(Debug)]
pub struct CurriculumAmplitude {
    bits: AtomicU32,
}

impl CurriculumAmplitude {
    pub fn new(initial: f32) -> Result<Self> {
        validate_amp(initial)?;
        Ok(Self {
            bits: AtomicU32::new(initial.to_bits()),
        })
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Set a new amplitude. Negative or non-finite values are rejected and
    /// the previous value is kept.
    pub fn set(&self, amp: f32) -> Result<()> {
        validate_amp(amp)?;
        self.bits.store(amp.to_bits(), Ordering::Release);
        Ok(())
    }
}

impl Default for CurriculumAmplitude {
    fn default() -> Self {
        Self {
            bits: AtomicU32::new(0.0f32.to_bits()),
        }
    }
}

impl Clone for CurriculumAmplitude {
    fn clone(&self) -> Self {
        Self {
            bits: AtomicU32::new(self.bits.load(Ordering::Acquire)),
        }
    }
}

pub(crate) fn validate_amp(amp: f32) -> Result<()> {
    if !amp.is_finite() || amp < 0.0 {
        return Err(DynSynError::InvalidAmplitude { value: amp });
    }
    Ok(())
}

/// Amplitude schedule over training steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CurriculumSchedule {
    /// Fixed amplitude.
    Constant { amp: f32 },
    /// `start` for `warmup_steps`, linear to `end` over `ramp_steps`, then `end`.
    Linear {
        start: f32,
        end: f32,
        #[serde(default)]
        warmup_steps: u64,
        ramp_steps: u64,
    },
}

impl Default for CurriculumSchedule {
    fn default() -> Self {
        CurriculumSchedule::Constant { amp: 0.0 }
    }
}

impl CurriculumSchedule {
    pub fn amp_at(&self, step: u64) -> f32 {
        match *self {
            CurriculumSchedule::Constant { amp } => amp,
            CurriculumSchedule::Linear {
                start,
                end,
                warmup_steps,
                ramp_steps,
            } => {
                if step <= warmup_steps {
                    return start;
                }
                let progressed = step - warmup_steps;
                if ramp_steps == 0 || progressed >= ramp_steps {
                    return end;
                }
                let frac = progressed as f64 / ramp_steps as f64;
                (start as f64 + (end as f64 - start as f64) * frac) as f32
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            CurriculumSchedule::Constant { amp } => validate_amp(amp),
            CurriculumSchedule::Linear { start, end, .. } => {
                validate_amp(start)?;
                validate_amp(end)
            }
        }
    }
}
