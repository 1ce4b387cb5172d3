//! Visited-marker storage for upstream tracing
//!
//! A delineation run needs one "already claimed" bit per cell. Two layouts
//! are available, chosen once per run with [`MarkerStrategy`]:
//!
//! - [`SeparateMarkers`]: one atomic byte per cell next to the output grid.
//!   The direction grid is only read.
//! - [`PackedMarkers`]: the spare sign bit of each direction cell. Saves the
//!   extra allocation; the direction grid carries tags until the run clears
//!   them.
//!
//! Claims are atomic test-and-set operations, so a cell reachable from two
//! outlets (malformed network) is claimed exactly once and the loser sees
//! the refusal.

use crate::maybe_rayon::*;
use catchment_core::{DirectionGrid, WatershedGrid};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

/// Physical layout of the visited marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerStrategy {
    /// Separate atomic byte per cell
    #[default]
    Separate,
    /// Sign bit of the direction cell
    Packed,
}

impl fmt::Display for MarkerStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerStrategy::Separate => f.write_str("separate"),
            MarkerStrategy::Packed => f.write_str("packed"),
        }
    }
}

impl FromStr for MarkerStrategy {
    type Err = catchment_core::Error;

    fn from_str(s: &str) -> catchment_core::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "separate" => Ok(MarkerStrategy::Separate),
            "packed" => Ok(MarkerStrategy::Packed),
            _ => Err(catchment_core::Error::InvalidParameter {
                name: "strategy",
                value: s.to_string(),
                reason: "expected separate or packed".to_string(),
            }),
        }
    }
}

/// Per-cell "claimed" flag shared by all tracers of a run.
pub trait MarkerStore: Sync {
    /// Grid dimensions as (rows, cols)
    fn shape(&self) -> (usize, usize);

    /// Whether (row, col) has been claimed
    fn is_claimed(&self, row: usize, col: usize) -> bool;

    /// Claim (row, col). Returns `true` if this call claimed it, `false` if
    /// it was already claimed.
    fn try_claim(&self, row: usize, col: usize) -> bool;

    /// Reset every unclaimed cell of `grid` to unassigned. Returns the number
    /// of cells left holding an id.
    fn finalize(&self, grid: &WatershedGrid) -> usize {
        let (rows, _) = self.shape();
        (0..rows)
            .into_par_iter()
            .map(|row| grid.finalize_row(row, |col| self.is_claimed(row, col)))
            .sum()
    }
}

/// Visited flags in their own array
#[derive(Debug)]
pub struct SeparateMarkers {
    visited: Box<[AtomicBool]>,
    rows: usize,
    cols: usize,
}

impl SeparateMarkers {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            visited: (0..rows * cols).map(|_| AtomicBool::new(false)).collect(),
            rows,
            cols,
        }
    }
}

impl MarkerStore for SeparateMarkers {
    fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    fn is_claimed(&self, row: usize, col: usize) -> bool {
        self.visited[row * self.cols + col].load(Ordering::Relaxed)
    }

    #[inline]
    fn try_claim(&self, row: usize, col: usize) -> bool {
        !self.visited[row * self.cols + col].swap(true, Ordering::Relaxed)
    }
}

/// Visited flags packed into the direction grid's tag bit.
///
/// Tags stay set after the run; the caller clears them with
/// [`DirectionGrid::clear_tags`] once the store is dropped.
#[derive(Debug, Clone, Copy)]
pub struct PackedMarkers<'a> {
    dirs: &'a DirectionGrid,
}

impl<'a> PackedMarkers<'a> {
    pub fn new(dirs: &'a DirectionGrid) -> Self {
        Self { dirs }
    }
}

impl MarkerStore for PackedMarkers<'_> {
    fn shape(&self) -> (usize, usize) {
        self.dirs.shape()
    }

    #[inline]
    fn is_claimed(&self, row: usize, col: usize) -> bool {
        self.dirs.is_tagged(row, col)
    }

    #[inline]
    fn try_claim(&self, row: usize, col: usize) -> bool {
        self.dirs.try_tag(row, col)
    }
}
