// src/placement.rs
//
// Compute placement and batched action buffers.
//
// - Placement:    where a buffer lives (host memory or an accelerator ordinal)
// - ActionBatch:  row-major f32 rows of a fixed width, tagged with a placement
// - PlacedTables: the layer's static index tables plus the placement they
//                 currently reside on; relocated once per placement change
//
// Every layer operation is row-wise, so leading batch dimensions of a policy
// output collapse into rows here.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{DynSynError, Result};

/// Memory placement of a buffer or table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    #[default]
    Host,
    Accelerator(u32),
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Host => write!(f, "host"),
            Placement::Accelerator(ordinal) => write!(f, "accelerator:{}", ordinal),
        }
    }
}

/// A batch of equally-wide f32 rows.
///
/// A zero-width batch still carries a row count: a layer whose groups are
/// all singletons has no follower actuators, yet its weight batch must line
/// up with the action batch row for row.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionBatch {
    data: Vec<f32>,
    rows: usize,
    width: usize,
    placement: Placement,
}

impl ActionBatch {
    /// Wrap a row-major buffer. `data.len()` must be a multiple of `width`.
    pub fn new(data: Vec<f32>, width: usize) -> Result<Self> {
        if width == 0 {
            if !data.is_empty() {
                return Err(DynSynError::ShapeMismatch {
                    what: "batch buffer (zero row width)",
                    expected: 0,
                    got: data.len(),
                });
            }
            return Ok(Self::zeros(0, 0));
        }
        if data.len() % width != 0 {
            return Err(DynSynError::ShapeMismatch {
                what: "batch buffer (not a multiple of the row width)",
                expected: width,
                got: data.len(),
            });
        }
        let rows = data.len() / width;
        Ok(Self {
            data,
            rows,
            width,
            placement: Placement::Host,
        })
    }

    /// A single-row batch.
    pub fn from_row(row: Vec<f32>) -> Self {
        let width = row.len();
        Self {
            data: row,
            rows: 1,
            width,
            placement: Placement::Host,
        }
    }

    /// Build from nested rows; every row must have the width of the first.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * width);
        for row in rows {
            if row.len() != width {
                return Err(DynSynError::ShapeMismatch {
                    what: "batch row",
                    expected: width,
                    got: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            data,
            rows: rows.len(),
            width,
            placement: Placement::Host,
        })
    }

    pub fn zeros(rows: usize, width: usize) -> Self {
        Self::filled(rows, width, 0.0)
    }

    pub fn filled(rows: usize, width: usize, value: f32) -> Self {
        Self {
            data: vec![value; rows * width],
            rows,
            width,
            placement: Placement::Host,
        }
    }

    /// Retag the batch with a placement. Data is not copied.
    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.width..(i + 1) * self.width]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        let w = self.width;
        &mut self.data[i * w..(i + 1) * w]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        (0..self.rows).map(move |i| self.row(i))
    }

    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        self.iter_rows().map(|r| r.to_vec()).collect()
    }

    /// Build a batch of `rows` rows of `width`, with row `i` written by `fill`.
    pub(crate) fn build_rows<F>(rows: usize, width: usize, placement: Placement, mut fill: F) -> Self
    where
        F: FnMut(usize, &mut [f32]),
    {
        let mut out = Self::zeros(rows, width).with_placement(placement);
        for i in 0..rows {
            fill(i, out.row_mut(i));
        }
        out
    }
}

struct Placed<T> {
    placement: Placement,
    tables: Arc<T>,
}

/// Static tables plus the placement they reside on.
///
/// `ensure_placement` compares the tables' own placement against the
/// requested one and relocates on mismatch; the new placement is cached so
/// repeated calls with the same placement are a read-lock and an `Arc` clone.
pub struct PlacedTables<T> {
    inner: RwLock<Placed<T>>,
    relocations: AtomicU64,
}

impl<T: Clone> PlacedTables<T> {
    pub fn new(tables: T, placement: Placement) -> Self {
        Self {
            inner: RwLock::new(Placed {
                placement,
                tables: Arc::new(tables),
            }),
            relocations: AtomicU64::new(0),
        }
    }

    /// Return the tables resident on `target`, relocating them first if needed.
    pub fn ensure_placement(&self, target: Placement) -> Arc<T> {
        {
            let placed = self.inner.read();
            if placed.placement == target {
                return Arc::clone(&placed.tables);
            }
        }

        let mut placed = self.inner.write();
        // Another evaluation may have relocated while we waited for the lock.
        if placed.placement != target {
            let from = placed.placement;
            placed.tables = Arc::new(placed.tables.as_ref().clone());
            placed.placement = target;
            self.relocations.fetch_add(1, Ordering::Relaxed);
            eprintln!("[placement] relocated index tables {} -> {}", from, target);
        }
        Arc::clone(&placed.tables)
    }

    /// Current tables without any placement check.
    pub fn current(&self) -> Arc<T> {
        Arc::clone(&self.inner.read().tables)
    }

    pub fn placement(&self) -> Placement {
        self.inner.read().placement
    }

    /// Number of relocations performed so far.
    pub fn relocations(&self) -> u64 {
        self.relocations.load(Ordering::Relaxed)
    }
}

impl<T: Clone> Clone for PlacedTables<T> {
    fn clone(&self) -> Self {
        let placed = self.inner.read();
        Self {
            inner: RwLock::new(Placed {
                placement: placed.placement,
                tables: Arc::clone(&placed.tables),
            }),
            relocations: AtomicU64::new(self.relocations()),
        }
    }
}

impl<T> fmt::Debug for PlacedTables<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlacedTables")
            .field("placement", &self.inner.read().placement)
            .field("relocations", &self.relocations.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_ragged_buffer() {
        assert!(ActionBatch::new(vec![1.0, 2.0, 3.0], 2).is_err());
        let ok = ActionBatch::new(vec![1.0, 2.0, 3.0, 4.0], 2).unwrap();
        assert_eq!(ok.rows(), 2);
        assert_eq!(ok.row(1), &[3.0, 4.0]);
    }

    #[test]
    fn zero_width_batch_keeps_row_count() {
        let b = ActionBatch::zeros(3, 0);
        assert_eq!(b.rows(), 3);
        assert_eq!(b.width(), 0);
        assert_eq!(b.iter_rows().count(), 3);
        assert!(b.iter_rows().all(|r| r.is_empty()));
    }

    #[test]
    fn from_rows_rejects_mismatched_widths() {
        let err = ActionBatch::from_rows(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, DynSynError::ShapeMismatch { expected: 2, got: 1, .. }));
    }

    #[test]
    fn placement_display() {
        assert_eq!(Placement::Host.to_string(), "host");
        assert_eq!(Placement::Accelerator(1).to_string(), "accelerator:1");
    }

    #[test]
    fn tables_relocate_once_per_placement_change() {
        let tables = PlacedTables::new(vec![1usize, 2, 3], Placement::Host);

        tables.ensure_placement(Placement::Host);
        assert_eq!(tables.relocations(), 0);

        let moved = tables.ensure_placement(Placement::Accelerator(0));
        assert_eq!(*moved, vec![1, 2, 3]);
        assert_eq!(tables.relocations(), 1);
        assert_eq!(tables.placement(), Placement::Accelerator(0));

        tables.ensure_placement(Placement::Accelerator(0));
        tables.ensure_placement(Placement::Accelerator(0));
        assert_eq!(tables.relocations(), 1, "cached placement must not relocate");

        tables.ensure_placement(Placement::Host);
        assert_eq!(tables.relocations(), 2);
    }
}
