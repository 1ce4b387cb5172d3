//! Outlets and outlet sets
//!
//! An outlet is the downstream end of a watershed: a cell plus the id every
//! cell draining through it receives. Outlets come from three places:
//! `(row, col, id)` triples, map coordinates resolved through a raster's
//! geotransform, or text of the form `"row,col,id;row,col,id"`.

use crate::error::{Error, Result};
use crate::raster::GeoTransform;
use std::ops::Index;
use std::str::FromStr;

/// A seed cell and the watershed id it propagates upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Outlet {
    pub row: usize,
    pub col: usize,
    /// Watershed id, must be non-zero
    pub id: u32,
}

impl Outlet {
    pub fn new(row: usize, col: usize, id: u32) -> Self {
        Self { row, col, id }
    }
}

/// Ordered collection of outlets.
///
/// Order matters only for malformed input: when two outlets share a cell the
/// earlier one keeps it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutletSet {
    outlets: Vec<Outlet>,
}

impl OutletSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(row, col, id)` triples
    pub fn from_triples(triples: &[(usize, usize, u32)]) -> Self {
        triples
            .iter()
            .map(|&(row, col, id)| Outlet::new(row, col, id))
            .collect()
    }

    /// Resolve `(x, y, id)` map coordinates to cells of a `rows` x `cols`
    /// raster georeferenced by `transform`.
    ///
    /// A point outside the raster extent is [`Error::OutletOutOfBounds`].
    pub fn from_coords(
        transform: &GeoTransform,
        rows: usize,
        cols: usize,
        points: &[(f64, f64, u32)],
    ) -> Result<Self> {
        points
            .iter()
            .enumerate()
            .map(|(index, &(x, y, id))| match transform.cell_at(x, y, rows, cols) {
                Some((row, col)) => Ok(Outlet::new(row, col, id)),
                None => {
                    let (col, row) = transform.geo_to_pixel(x, y);
                    Err(Error::OutletOutOfBounds {
                        index,
                        row: row.floor() as i64,
                        col: col.floor() as i64,
                        rows,
                        cols,
                    })
                }
            })
            .collect()
    }

    /// Parse `"row,col,id"` entries separated by `;` or newlines.
    ///
    /// Text after `#` on a line is ignored.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(parse_triples::<usize, usize>(text)?
            .into_iter()
            .map(|(row, col, id)| Outlet::new(row, col, id))
            .collect())
    }

    pub fn push(&mut self, outlet: Outlet) {
        self.outlets.push(outlet);
    }

    pub fn len(&self) -> usize {
        self.outlets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outlets.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Outlet> {
        self.outlets.iter()
    }

    /// Fail fast on any outlet outside a `rows` x `cols` grid or carrying
    /// the reserved id 0.
    pub fn validate(&self, rows: usize, cols: usize) -> Result<()> {
        for (index, outlet) in self.outlets.iter().enumerate() {
            if outlet.row >= rows || outlet.col >= cols {
                return Err(Error::OutletOutOfBounds {
                    index,
                    row: outlet.row as i64,
                    col: outlet.col as i64,
                    rows,
                    cols,
                });
            }
            if outlet.id == 0 {
                return Err(Error::InvalidParameter {
                    name: "outlet id",
                    value: "0".to_string(),
                    reason: format!("outlet #{index} uses the reserved unassigned id"),
                });
            }
        }
        Ok(())
    }
}

/// Parse `(x, y, id)` map coordinates, same layout as [`OutletSet::parse`]
pub fn parse_coords(text: &str) -> Result<Vec<(f64, f64, u32)>> {
    parse_triples::<f64, f64>(text)
}

fn parse_triples<A: FromStr, B: FromStr>(text: &str) -> Result<Vec<(A, B, u32)>> {
    let mut triples = Vec::new();

    for line in text.lines() {
        let line = line.split('#').next().unwrap_or("");
        for entry in line.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let invalid = |reason: &str| Error::InvalidParameter {
                name: "outlets",
                value: entry.to_string(),
                reason: reason.to_string(),
            };

            let parts: Vec<&str> = entry.split(',').map(str::trim).collect();
            if parts.len() != 3 {
                return Err(invalid("expected three comma-separated values"));
            }

            let a = parts[0].parse().map_err(|_| invalid("bad first value"))?;
            let b = parts[1].parse().map_err(|_| invalid("bad second value"))?;
            let id = parts[2].parse().map_err(|_| invalid("bad id"))?;
            triples.push((a, b, id));
        }
    }

    Ok(triples)
}

impl Index<usize> for OutletSet {
    type Output = Outlet;

    fn index(&self, index: usize) -> &Outlet {
        &self.outlets[index]
    }
}

impl FromIterator<Outlet> for OutletSet {
    fn from_iter<I: IntoIterator<Item = Outlet>>(iter: I) -> Self {
        Self {
            outlets: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a OutletSet {
    type Item = &'a Outlet;
    type IntoIter = std::slice::Iter<'a, Outlet>;

    fn into_iter(self) -> Self::IntoIter {
        self.outlets.iter()
    }
}
