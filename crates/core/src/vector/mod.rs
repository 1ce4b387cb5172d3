//! Point features: outlets (pour points) that seed watershed delineation

mod outlet;

pub use outlet::{parse_coords, Outlet, OutletSet};
