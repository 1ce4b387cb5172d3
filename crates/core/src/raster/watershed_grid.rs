//! Output grid of watershed ids

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};
use std::sync::atomic::{AtomicU32, Ordering};

/// Id value of a cell that drains to no outlet
pub const UNASSIGNED: u32 = 0;

/// Watershed id per cell, written concurrently by upstream traversals.
///
/// Writes go through shared references (`&self`) so that one grid can be
/// handed to every worker. Each cell is expected to be written by at most
/// one traversal; that is a property of the flow network, not something this
/// type enforces. Atomic cells keep the grid free of data races even when the
/// network breaks that expectation.
#[derive(Debug)]
pub struct WatershedGrid {
    ids: Box<[AtomicU32]>,
    rows: usize,
    cols: usize,
}

impl WatershedGrid {
    /// Allocate a grid with every cell unassigned
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            ids: (0..rows * cols).map(|_| AtomicU32::new(UNASSIGNED)).collect(),
            rows,
            cols,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[inline]
    fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    /// Assign `id` to (row, col).
    ///
    /// # Panics
    /// Panics if (row, col) is outside the grid.
    #[inline]
    pub fn set(&self, row: usize, col: usize, id: u32) {
        self.ids[self.index(row, col)].store(id, Ordering::Relaxed);
    }

    /// Raw id at (row, col), [`UNASSIGNED`] if none.
    ///
    /// # Panics
    /// Panics if (row, col) is outside the grid.
    #[inline]
    pub fn id(&self, row: usize, col: usize) -> u32 {
        self.ids[self.index(row, col)].load(Ordering::Relaxed)
    }

    /// Watershed id at (row, col), `None` if unassigned.
    pub fn get(&self, row: usize, col: usize) -> Result<Option<u32>> {
        if row >= self.rows || col >= self.cols {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        let id = self.id(row, col);
        Ok((id != UNASSIGNED).then_some(id))
    }

    /// Sweep the grid and reset every cell that `is_claimed` rejects to
    /// [`UNASSIGNED`]. Returns the number of cells left assigned.
    pub fn finalize<F>(&self, is_claimed: F) -> usize
    where
        F: Fn(usize, usize) -> bool,
    {
        (0..self.rows)
            .map(|row| self.finalize_row(row, |col| is_claimed(row, col)))
            .sum()
    }

    /// [`WatershedGrid::finalize`] for a single row, so callers can sweep
    /// rows in parallel.
    pub fn finalize_row<F>(&self, row: usize, is_claimed: F) -> usize
    where
        F: Fn(usize) -> bool,
    {
        let start = row * self.cols;
        let mut assigned = 0;
        for (col, cell) in self.ids[start..start + self.cols].iter().enumerate() {
            if is_claimed(col) && cell.load(Ordering::Relaxed) != UNASSIGNED {
                assigned += 1;
            } else {
                cell.store(UNASSIGNED, Ordering::Relaxed);
            }
        }
        assigned
    }

    /// Number of cells holding an id
    pub fn assigned_count(&self) -> usize {
        self.ids
            .iter()
            .filter(|id| id.load(Ordering::Relaxed) != UNASSIGNED)
            .count()
    }

    /// Ids in row-major order
    pub fn to_vec(&self) -> Vec<u32> {
        self.ids.iter().map(|id| id.load(Ordering::Relaxed)).collect()
    }

    /// Read view for raster writers: ids with no-data = [`UNASSIGNED`].
    pub fn to_raster(&self, transform: &GeoTransform) -> Result<Raster<u32>> {
        let mut raster = Raster::from_vec(self.to_vec(), self.rows, self.cols)?;
        raster.set_transform(*transform);
        raster.set_nodata(Some(UNASSIGNED));
        Ok(raster)
    }
}

impl Clone for WatershedGrid {
    fn clone(&self) -> Self {
        Self {
            ids: self.to_vec().into_iter().map(AtomicU32::new).collect(),
            rows: self.rows,
            cols: self.cols,
        }
    }
}

impl PartialEq for WatershedGrid {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape() && self.to_vec() == other.to_vec()
    }
}
