//! Watershed delineation on D8 flow direction grids
//!
//! - [`marker`]: where the per-cell visited flag lives during a run
//! - [`tracer`]: upstream traversal from one outlet
//! - [`delineate_watersheds`]: seeding, parallel tracing and finalization
//!   over a whole outlet set

pub mod marker;
pub mod tracer;
mod watershed;

pub use marker::{MarkerStore, MarkerStrategy, PackedMarkers, SeparateMarkers};
pub use tracer::{SeedOutcome, TraceStats, UpstreamTracer};
pub use watershed::{
    delineate_watersheds, delineate_watersheds_with_outlets, watershed, Delineation,
    DelineationReport, Watershed, WatershedParams,
};
