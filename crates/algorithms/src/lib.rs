//! # Catchment Algorithms
//!
//! Parallel watershed delineation for catchment.
//!
//! Given a D8 flow direction grid and a set of outlets, every cell whose
//! flow reaches an outlet is labeled with that outlet's id. Outlets are
//! traced concurrently, one task per outlet, without locks.
//!
//! ```
//! use catchment_algorithms::prelude::*;
//!
//! // Three cells draining east into an outlet at the end of the row
//! let mut dirs = DirectionGrid::from_codes(1, 3, vec![1, 1, 1]).unwrap();
//! let outlets = OutletSet::from_triples(&[(0, 2, 7)]);
//!
//! let result = delineate_watersheds(&mut dirs, &outlets, &WatershedParams::default()).unwrap();
//! assert_eq!(result.grid.to_vec(), vec![7, 7, 7]);
//! ```

pub mod hydrology;
mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::hydrology::{
        delineate_watersheds, delineate_watersheds_with_outlets, watershed, Delineation,
        DelineationReport, MarkerStrategy, Watershed, WatershedParams,
    };
    pub use catchment_core::prelude::*;
}
