//! D8 flow direction codes
//!
//! Canonical encoding: one bit flag per octant, clockwise from east.
//! ```text
//!   32  64 128
//!   16   0   1
//!    8   4   2
//! ```
//! `0` = no data (the cell takes part in no flow path).
//!
//! Rasters produced by other tools use one of three conventions, all
//! converted by [`normalize_directions`]:
//! - power of two (the canonical encoding above)
//! - degrees counter-clockwise from east (`45` = NE ... `360` = E)
//! - degrees / 45 (`1` = NE ... `8` = E)

use crate::error::{Error, Result};
use crate::raster::Raster;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// No-data direction code
pub const NODATA: u8 = 0;

/// A single flow direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    East = 1,
    SouthEast = 2,
    South = 4,
    SouthWest = 8,
    West = 16,
    NorthWest = 32,
    North = 64,
    NorthEast = 128,
}

impl Direction {
    /// All directions in scan order (clockwise from east)
    pub const ALL: [Direction; 8] = [
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
        Direction::North,
        Direction::NorthEast,
    ];

    /// Parse a canonical code. `None` for no data and for illegal values.
    pub fn from_code(code: u8) -> Option<Self> {
        if code.is_power_of_two() {
            Some(Self::ALL[code.trailing_zeros() as usize])
        } else {
            None
        }
    }

    /// Canonical bit-flag code
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Position in [`Direction::ALL`]
    pub fn index(self) -> usize {
        self.code().trailing_zeros() as usize
    }

    /// Row/column offset of the cell this direction points at
    pub fn offset(self) -> (isize, isize) {
        OFFSETS[self.index()]
    }

    pub fn opposite(self) -> Self {
        Self::ALL[(self.index() + 4) % 8]
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::East => "E",
            Direction::SouthEast => "SE",
            Direction::South => "S",
            Direction::SouthWest => "SW",
            Direction::West => "W",
            Direction::NorthWest => "NW",
            Direction::North => "N",
            Direction::NorthEast => "NE",
        };
        f.pad(name)
    }
}

/// Neighbor offsets `(row, col)` in [`Direction::ALL`] order
pub const OFFSETS: [(isize, isize); 8] = [
    (0, 1),   // E
    (1, 1),   // SE
    (1, 0),   // S
    (1, -1),  // SW
    (0, -1),  // W
    (-1, -1), // NW
    (-1, 0),  // N
    (-1, 1),  // NE
];

/// Code the neighbor at `OFFSETS[i]` must hold to drain into the center cell.
pub const INFLOW_CODES: [u8; 8] = [
    Direction::West as u8,
    Direction::NorthWest as u8,
    Direction::North as u8,
    Direction::NorthEast as u8,
    Direction::East as u8,
    Direction::SouthEast as u8,
    Direction::South as u8,
    Direction::SouthWest as u8,
];

/// Whether `code` is no data or one of the eight canonical codes
pub fn is_valid_code(code: u8) -> bool {
    code == NODATA || code.is_power_of_two()
}

/// Counter-clockwise octants used by the degree based conventions, `1` = NE
const CCW_FROM_NE: [Direction; 8] = [
    Direction::NorthEast,
    Direction::North,
    Direction::NorthWest,
    Direction::West,
    Direction::SouthWest,
    Direction::South,
    Direction::SouthEast,
    Direction::East,
];

/// Convention a raw direction raster is encoded in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionFormat {
    /// Detect from the value range
    #[default]
    Auto,
    /// Degrees counter-clockwise from east (45..=360)
    Degree,
    /// Degrees divided by 45 (1..=8)
    Degree45,
    /// Power of two, clockwise from east (1..=128)
    Power2,
}

impl DirectionFormat {
    /// Pick a format from the largest absolute valid value in a raster.
    pub fn detect(max_value: u32) -> Self {
        if max_value == 0 {
            DirectionFormat::Power2
        } else if max_value <= 8 {
            DirectionFormat::Degree45
        } else if max_value <= 128 {
            DirectionFormat::Power2
        } else {
            DirectionFormat::Degree
        }
    }

    /// Decode one non-zero absolute value into a direction.
    ///
    /// Returns `None` when the value is not legal in this format. `Auto`
    /// must be resolved with [`DirectionFormat::detect`] first.
    pub fn decode(self, value: u32) -> Option<Direction> {
        match self {
            DirectionFormat::Auto => None,
            DirectionFormat::Degree45 => {
                (1..=8).contains(&value).then(|| CCW_FROM_NE[value as usize - 1])
            }
            DirectionFormat::Degree => (value % 45 == 0 && (45..=360).contains(&value))
                .then(|| CCW_FROM_NE[(value / 45) as usize - 1]),
            DirectionFormat::Power2 => u8::try_from(value).ok().and_then(Direction::from_code),
        }
    }
}

impl fmt::Display for DirectionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DirectionFormat::Auto => "auto",
            DirectionFormat::Degree => "degree",
            DirectionFormat::Degree45 => "degree45",
            DirectionFormat::Power2 => "power2",
        };
        f.pad(name)
    }
}

impl FromStr for DirectionFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(DirectionFormat::Auto),
            "degree" | "degrees" => Ok(DirectionFormat::Degree),
            "degree45" | "45degree" => Ok(DirectionFormat::Degree45),
            "power2" => Ok(DirectionFormat::Power2),
            _ => Err(Error::InvalidParameter {
                name: "format",
                value: s.to_string(),
                reason: "expected auto, degree, degree45 or power2".to_string(),
            }),
        }
    }
}

/// Convert a raw direction raster into canonical codes.
///
/// Zero and the raster's no-data value become [`NODATA`]. Negative values,
/// which some tools use to flag flow leaving the map, are read by absolute
/// value. Returns the row-major codes and the format that was applied
/// (resolved when `format` is `Auto`).
///
/// Any value that is not legal in the applied format is reported as
/// [`Error::InvalidDirectionCode`] for the first offending cell.
pub fn normalize_directions(
    raw: &Raster<i32>,
    format: DirectionFormat,
) -> Result<(Vec<u8>, DirectionFormat)> {
    let is_flow = |v: i32| v != 0 && !raw.is_nodata(v);

    let format = match format {
        DirectionFormat::Auto => {
            let max = raw
                .data()
                .iter()
                .filter(|&&v| is_flow(v))
                .map(|v| v.unsigned_abs())
                .max()
                .unwrap_or(0);
            let detected = DirectionFormat::detect(max);
            tracing::debug!("direction format detected as {} (max value {})", detected, max);
            detected
        }
        other => other,
    };

    let mut codes = Vec::with_capacity(raw.len());
    for (row, col, value) in raw.indexed_iter() {
        if !is_flow(value) {
            codes.push(NODATA);
            continue;
        }
        match format.decode(value.unsigned_abs()) {
            Some(dir) => codes.push(dir.code()),
            None => {
                return Err(Error::InvalidDirectionCode {
                    row,
                    col,
                    value: value as i64,
                })
            }
        }
    }

    Ok((codes, format))
}
