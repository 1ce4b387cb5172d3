//! Flow direction grid with a packed visited tag
//!
//! Each cell stores its canonical direction code in the low byte of an
//! `i16`. The sign bit is free and serves as an optional "visited" tag for
//! traversals that cannot afford a separate marker array. All reads through
//! the public accessors mask the tag off, so a tagged grid reads exactly like
//! an untagged one.
//!
//! Cells are atomics so that concurrent traversals can tag disjoint cells
//! while reading their neighbors without locks.

use crate::error::{Error, Result};
use crate::raster::direction::{is_valid_code, normalize_directions, NODATA};
use crate::raster::{Direction, DirectionFormat, GeoTransform, Raster};
use std::sync::atomic::{AtomicI16, Ordering};

const TAG: i16 = i16::MIN;
const CODE_MASK: i16 = 0x00ff;

/// One direction cell: code in the low byte, visited tag in the sign bit.
#[derive(Debug)]
struct TaggedCell(AtomicI16);

impl TaggedCell {
    fn new(code: u8) -> Self {
        Self(AtomicI16::new(code as i16))
    }

    #[inline]
    fn code(&self) -> u8 {
        (self.0.load(Ordering::Relaxed) & CODE_MASK) as u8
    }

    #[inline]
    fn is_tagged(&self) -> bool {
        self.0.load(Ordering::Relaxed) & TAG != 0
    }

    /// Set the tag; `true` if this call set it.
    #[inline]
    fn try_tag(&self) -> bool {
        self.0.fetch_or(TAG, Ordering::Relaxed) & TAG == 0
    }

    fn clear_tag(&mut self) -> bool {
        let raw = self.0.get_mut();
        let was_tagged = *raw & TAG != 0;
        *raw &= CODE_MASK;
        was_tagged
    }
}

/// Row-major D8 flow direction grid.
///
/// Only the eight canonical codes and [`NODATA`] can be stored; every
/// constructor rejects anything else.
#[derive(Debug)]
pub struct DirectionGrid {
    cells: Box<[TaggedCell]>,
    rows: usize,
    cols: usize,
    transform: GeoTransform,
}

impl DirectionGrid {
    /// Build a grid from canonical codes in row-major order.
    pub fn from_codes(rows: usize, cols: usize, codes: Vec<u8>) -> Result<Self> {
        if codes.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        if let Some(pos) = codes.iter().position(|&c| !is_valid_code(c)) {
            return Err(Error::InvalidDirectionCode {
                row: pos / cols,
                col: pos % cols,
                value: codes[pos] as i64,
            });
        }

        Ok(Self {
            cells: codes.into_iter().map(TaggedCell::new).collect(),
            rows,
            cols,
            transform: GeoTransform::default(),
        })
    }

    /// Build a grid with every cell set to no data
    pub fn nodata(rows: usize, cols: usize) -> Self {
        Self {
            cells: (0..rows * cols).map(|_| TaggedCell::new(NODATA)).collect(),
            rows,
            cols,
            transform: GeoTransform::default(),
        }
    }

    /// Normalize a raw direction raster and build a grid from it.
    ///
    /// The raster's geotransform is carried over. Returns the grid together
    /// with the format that was applied.
    pub fn from_raster(raw: &Raster<i32>, format: DirectionFormat) -> Result<(Self, DirectionFormat)> {
        let (rows, cols) = raw.shape();
        let (codes, applied) = normalize_directions(raw, format)?;
        let mut grid = Self::from_codes(rows, cols, codes)?;
        grid.transform = *raw.transform();
        Ok((grid, applied))
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Whether (row, col) lies inside the grid
    #[inline]
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols
    }

    #[inline]
    fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    fn check_bounds(&self, row: usize, col: usize) -> Result<()> {
        if self.contains(row, col) {
            Ok(())
        } else {
            Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            })
        }
    }

    /// Flow direction at (row, col); `None` for no data.
    pub fn get_direction(&self, row: usize, col: usize) -> Result<Option<Direction>> {
        self.check_bounds(row, col)?;
        Ok(Direction::from_code(self.code(row, col)))
    }

    /// Canonical code at (row, col), tag masked off.
    ///
    /// # Panics
    /// Panics if (row, col) is outside the grid.
    #[inline]
    pub fn code(&self, row: usize, col: usize) -> u8 {
        self.cells[self.index(row, col)].code()
    }

    /// Cell the flow from (row, col) enters, or `None` for no data and for
    /// flow leaving the grid.
    pub fn downstream(&self, row: usize, col: usize) -> Option<(usize, usize)> {
        let (dr, dc) = Direction::from_code(self.code(row, col))?.offset();
        let nr = row.checked_add_signed(dr)?;
        let nc = col.checked_add_signed(dc)?;
        self.contains(nr, nc).then_some((nr, nc))
    }

    /// Re-check every cell for an illegal code.
    pub fn validate(&self) -> Result<()> {
        match self.cells.iter().position(|c| !is_valid_code(c.code())) {
            Some(pos) => Err(Error::InvalidDirectionCode {
                row: pos / self.cols,
                col: pos % self.cols,
                value: self.cells[pos].code() as i64,
            }),
            None => Ok(()),
        }
    }

    // Packed visited tag

    /// Atomically tag (row, col). Returns `true` if this call set the tag,
    /// `false` if it was already set.
    #[inline]
    pub fn try_tag(&self, row: usize, col: usize) -> bool {
        self.cells[self.index(row, col)].try_tag()
    }

    #[inline]
    pub fn is_tagged(&self, row: usize, col: usize) -> bool {
        self.cells[self.index(row, col)].is_tagged()
    }

    /// Number of tagged cells
    pub fn tagged_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_tagged()).count()
    }

    /// Clear every tag, returning how many were set.
    pub fn clear_tags(&mut self) -> usize {
        self.cells
            .iter_mut()
            .map(TaggedCell::clear_tag)
            .filter(|&was_tagged| was_tagged)
            .count()
    }

    /// Count of cells per code, indexed by [`Direction::index`]; the ninth
    /// slot counts no data.
    pub fn histogram(&self) -> [usize; 9] {
        let mut counts = [0usize; 9];
        for cell in self.cells.iter() {
            match Direction::from_code(cell.code()) {
                Some(dir) => counts[dir.index()] += 1,
                None => counts[8] += 1,
            }
        }
        counts
    }

    /// Canonical codes as a raster, no data = 0
    pub fn to_raster(&self) -> Result<Raster<u8>> {
        let codes = self.cells.iter().map(TaggedCell::code).collect();
        let mut raster = Raster::from_vec(codes, self.rows, self.cols)?;
        raster.set_transform(self.transform);
        raster.set_nodata(Some(NODATA));
        Ok(raster)
    }
}

impl Clone for DirectionGrid {
    /// Clones codes only; tags are not carried over.
    fn clone(&self) -> Self {
        Self {
            cells: self.cells.iter().map(|c| TaggedCell::new(c.code())).collect(),
            rows: self.rows,
            cols: self.cols,
            transform: self.transform,
        }
    }
}

impl PartialEq for DirectionGrid {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape()
            && self
                .cells
                .iter()
                .zip(other.cells.iter())
                .all(|(a, b)| a.code() == b.code())
    }
}
