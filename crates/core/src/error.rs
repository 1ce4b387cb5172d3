//! Error types for catchment

use thiserror::Error;

/// Main error type for catchment operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    /// A raster sample the target cell type cannot represent
    #[error("Sample {value} at ({row}, {col}) does not fit the raster cell type")]
    InvalidSample { row: usize, col: usize, value: f64 },

    /// A flow direction value that is not one of the eight legal codes
    #[error("Invalid flow direction code {value} at ({row}, {col})")]
    InvalidDirectionCode { row: usize, col: usize, value: i64 },

    /// An outlet that falls outside the direction grid
    #[error("Outlet #{index} at ({row}, {col}) lies outside raster of size ({rows}, {cols})")]
    OutletOutOfBounds {
        index: usize,
        row: i64,
        col: i64,
        rows: usize,
        cols: usize,
    },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for catchment operations
pub type Result<T> = std::result::Result<T, Error>;
