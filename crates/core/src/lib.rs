//! # Catchment Core
//!
//! Core types, traits and I/O for catchment.
//!
//! This crate provides:
//! - `DirectionGrid`: D8 flow directions with a packed visited tag
//! - `WatershedGrid`: watershed ids written by concurrent traversals
//! - `OutletSet`: the seeds of a delineation run
//! - `Raster<T>` and `GeoTransform` for georeferenced exchange with GeoTIFF
//! - Algorithm trait for a consistent API

pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use error::{Error, Result};
pub use raster::{
    Direction, DirectionFormat, DirectionGrid, GeoTransform, Raster, RasterElement, WatershedGrid,
    UNASSIGNED,
};
pub use vector::{Outlet, OutletSet};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::raster::{
        Direction, DirectionFormat, DirectionGrid, GeoTransform, Raster, RasterElement,
        WatershedGrid, UNASSIGNED,
    };
    pub use crate::vector::{Outlet, OutletSet};
    pub use crate::Algorithm;
}

/// Core trait for all algorithms in catchment.
///
/// Algorithms transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
