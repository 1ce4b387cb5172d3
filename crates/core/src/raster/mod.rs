//! Raster data structures: generic rasters, flow direction and watershed grids

pub mod direction;
mod direction_grid;
mod element;
mod geotransform;
mod grid;
mod watershed_grid;

pub use direction::{normalize_directions, Direction, DirectionFormat};
pub use direction_grid::DirectionGrid;
pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::Raster;
pub use watershed_grid::{WatershedGrid, UNASSIGNED};
