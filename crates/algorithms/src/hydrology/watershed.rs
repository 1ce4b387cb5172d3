//! Watershed delineation from outlets
//!
//! Labels every cell of a D8 flow direction grid with the id of the outlet
//! its flow reaches. A run has three phases:
//! - Seed: every outlet cell is claimed, in outlet order, before any tracing.
//!   A nested outlet therefore always stops the trace of the outlet
//!   downstream of it, whatever the scheduling.
//! - Trace: one upstream traversal per seeded outlet, run on the worker pool.
//! - Finalize: cells no traversal claimed are reset to unassigned.

use super::marker::{MarkerStore, MarkerStrategy, PackedMarkers, SeparateMarkers};
use super::tracer::{SeedOutcome, TraceStats, UpstreamTracer};
use catchment_core::raster::{DirectionFormat, GeoTransform, Raster};
use catchment_core::{Algorithm, DirectionGrid, Error, OutletSet, Result, WatershedGrid};
use catchment_parallel::{ParallelStrategy, ProcessingMode};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Parameters for watershed delineation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WatershedParams {
    /// Where the per-cell visited marker lives
    pub strategy: MarkerStrategy,
    /// Worker threads for the trace phase (0 = all cores, 1 = serial)
    pub threads: usize,
}

/// Counters describing one delineation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DelineationReport {
    /// Outlets supplied
    pub outlets: usize,
    /// Outlets on no-data cells, not traced
    pub skipped_nodata: usize,
    /// Outlets on a cell an earlier outlet already holds, not traced
    pub duplicate_outlets: usize,
    /// Cells claimed by traversals, outlet cells included
    pub traced_cells: usize,
    /// Claims refused because the cell belonged to another outlet
    pub conflicts: usize,
    /// Deepest confluence stack of any traversal
    pub max_stack_depth: usize,
    /// Cells holding an id after finalization
    pub assigned_cells: usize,
}

/// Output of a delineation run
#[derive(Debug, Clone)]
pub struct Delineation {
    pub grid: WatershedGrid,
    pub report: DelineationReport,
}

impl Delineation {
    /// Watershed ids as a georeferenced raster, no data = 0
    pub fn to_raster(&self, transform: &GeoTransform) -> Result<Raster<u32>> {
        self.grid.to_raster(transform)
    }
}

/// Watershed delineation algorithm
#[derive(Debug, Clone, Default)]
pub struct Watershed;

impl Algorithm for Watershed {
    type Input = (DirectionGrid, OutletSet);
    type Output = Delineation;
    type Params = WatershedParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Watershed"
    }

    fn description(&self) -> &'static str {
        "Delineate watersheds upstream of outlets on a D8 flow direction grid"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (mut dirs, outlets) = input;
        delineate_watersheds(&mut dirs, &outlets, &params)
    }
}

/// Delineate the watershed of every outlet.
///
/// The grid is taken mutably because the packed strategy tags its cells
/// during the run; every tag is cleared again before this returns, so the
/// grid reads exactly as before.
///
/// # Errors
/// Illegal direction codes, outlets outside the grid and outlets with id 0
/// are rejected before anything is written.
pub fn delineate_watersheds(
    dirs: &mut DirectionGrid,
    outlets: &OutletSet,
    params: &WatershedParams,
) -> Result<Delineation> {
    let (rows, cols) = dirs.shape();
    dirs.validate()?;
    outlets.validate(rows, cols)?;

    let mode = ProcessingMode::from_threads(params.threads);
    debug!(
        "delineating {} outlets on {}x{} grid ({} markers, {} workers)",
        outlets.len(),
        rows,
        cols,
        params.strategy,
        mode.workers()
    );

    let grid = WatershedGrid::new(rows, cols);
    let report = match params.strategy {
        MarkerStrategy::Separate => {
            let markers = SeparateMarkers::new(rows, cols);
            run(dirs, &markers, outlets, &grid, mode)?
        }
        MarkerStrategy::Packed => {
            let result = {
                let view: &DirectionGrid = dirs;
                run(view, &PackedMarkers::new(view), outlets, &grid, mode)
            };
            // Tags go even when the run failed
            let cleared = dirs.clear_tags();
            debug!("cleared {} packed tags", cleared);
            result?
        }
    };

    debug!(
        "delineation done: {} cells assigned, {} conflicts",
        report.assigned_cells, report.conflicts
    );
    Ok(Delineation { grid, report })
}

fn run<M: MarkerStore>(
    dirs: &DirectionGrid,
    markers: &M,
    outlets: &OutletSet,
    grid: &WatershedGrid,
    mode: ProcessingMode,
) -> Result<DelineationReport> {
    let tracer = UpstreamTracer::new(dirs, markers, grid);
    let mut report = DelineationReport {
        outlets: outlets.len(),
        ..Default::default()
    };

    let mut seeded = Vec::with_capacity(outlets.len());
    for outlet in outlets {
        match tracer.seed(outlet) {
            SeedOutcome::Claimed => seeded.push(*outlet),
            SeedOutcome::NoData => {
                trace!("outlet {} at ({}, {}) is on no data", outlet.id, outlet.row, outlet.col);
                report.skipped_nodata += 1;
            }
            SeedOutcome::AlreadyClaimed => {
                trace!("outlet {} at ({}, {}) is already claimed", outlet.id, outlet.row, outlet.col);
                report.duplicate_outlets += 1;
            }
        }
    }
    debug!("seeded {} of {} outlets", seeded.len(), outlets.len());

    let stats = mode.par_map(0..seeded.len(), |i| {
        let outlet = &seeded[i];
        let stats = tracer.trace(outlet.row, outlet.col, outlet.id);
        trace!(
            "outlet {}: {} cells, {} confluences, stack depth {}",
            outlet.id,
            stats.cells + 1,
            stats.confluences,
            stats.max_stack
        );
        stats
    })?;
    let total = stats.into_iter().fold(TraceStats::default(), TraceStats::merge);
    debug!("traced {} cells through {} confluences", total.cells, total.confluences);

    report.traced_cells = total.cells + seeded.len();
    report.conflicts = total.conflicts;
    report.max_stack_depth = total.max_stack;
    report.assigned_cells = markers.finalize(grid);
    Ok(report)
}

/// Delineate from `(row, col, id)` triples without touching `dirs`.
pub fn delineate_watersheds_with_outlets(
    dirs: &DirectionGrid,
    outlets: &[(usize, usize, u32)],
    params: &WatershedParams,
) -> Result<Delineation> {
    let mut dirs = dirs.clone();
    delineate_watersheds(&mut dirs, &OutletSet::from_triples(outlets), params)
}

/// Delineate straight from a raw direction raster.
///
/// The raster is normalized with `format` first; the returned raster carries
/// the input's geotransform and no data = 0.
pub fn watershed(
    flow_dir: &Raster<i32>,
    format: DirectionFormat,
    outlets: &OutletSet,
    params: &WatershedParams,
) -> Result<Raster<u32>> {
    let (mut dirs, applied) = DirectionGrid::from_raster(flow_dir, format)?;
    debug!("flow directions read as {}", applied);
    let delineation = delineate_watersheds(&mut dirs, outlets, params)?;
    delineation.to_raster(flow_dir.transform())
}

#[cfg(test)]
mod tests {
    use super::*;
    use catchment_core::{Outlet, UNASSIGNED};

    const E: u8 = 1;
    const S: u8 = 4;
    const W: u8 = 16;
    const N: u8 = 64;

    fn both_strategies() -> [WatershedParams; 2] {
        [
            WatershedParams { strategy: MarkerStrategy::Separate, threads: 1 },
            WatershedParams { strategy: MarkerStrategy::Packed, threads: 1 },
        ]
    }

    #[test]
    fn test_single_row_all_east() {
        for params in both_strategies() {
            let mut dirs = DirectionGrid::from_codes(1, 5, vec![E; 5]).unwrap();
            let outlets = OutletSet::from_triples(&[(0, 4, 1)]);

            let result = delineate_watersheds(&mut dirs, &outlets, &params).unwrap();
            assert_eq!(result.grid.to_vec(), vec![1; 5], "{:?}", params.strategy);
            assert_eq!(result.report.assigned_cells, 5);
            assert_eq!(result.report.traced_cells, 5);
            assert_eq!(dirs.tagged_count(), 0);
        }
    }

    #[test]
    fn test_junction_collects_both_branches() {
        // Two 3-cell branches meet at (1,3), which drains into the outlet
        #[rustfmt::skip]
        let codes = vec![
            E, E, E, S, W, W, W,
            0, 0, 0, S, 0, 0, 0,
        ];
        for params in both_strategies() {
            let mut dirs = DirectionGrid::from_codes(2, 7, codes.clone()).unwrap();
            let outlets = OutletSet::from_triples(&[(1, 3, 7)]);

            let result = delineate_watersheds(&mut dirs, &outlets, &params).unwrap();
            assert_eq!(result.report.assigned_cells, 8);
            assert_eq!(result.report.max_stack_depth, 1);
            #[rustfmt::skip]
            let expected = vec![
                7, 7, 7, 7, 7, 7, 7,
                0, 0, 0, 7, 0, 0, 0,
            ];
            assert_eq!(result.grid.to_vec(), expected);
        }
    }

    #[test]
    fn test_illegal_code_aborts() {
        let raw = Raster::from_vec(vec![1, 1, 3, 1], 2, 2).unwrap();
        let outlets = OutletSet::from_triples(&[(0, 1, 1)]);

        let err = watershed(&raw, DirectionFormat::Power2, &outlets, &WatershedParams::default());
        assert!(matches!(
            err,
            Err(Error::InvalidDirectionCode { row: 1, col: 0, value: 3 })
        ));
    }

    #[test]
    fn test_bad_outlets_rejected() {
        let mut dirs = DirectionGrid::from_codes(1, 3, vec![E, E, 0]).unwrap();

        let out_of_bounds = OutletSet::from_triples(&[(0, 1, 1), (0, 9, 2)]);
        let err = delineate_watersheds(&mut dirs, &out_of_bounds, &WatershedParams::default());
        assert!(matches!(err, Err(Error::OutletOutOfBounds { index: 1, .. })));

        let zero_id = OutletSet::from_triples(&[(0, 1, 0)]);
        assert!(delineate_watersheds(&mut dirs, &zero_id, &WatershedParams::default()).is_err());
    }

    #[test]
    fn test_skips_nodata_and_duplicate_outlets() {
        let mut dirs = DirectionGrid::from_codes(1, 4, vec![E, E, 0, N]).unwrap();
        let outlets = OutletSet::from_triples(&[(0, 1, 1), (0, 2, 2), (0, 1, 3)]);

        let result =
            delineate_watersheds(&mut dirs, &outlets, &WatershedParams::default()).unwrap();
        assert_eq!(result.report.outlets, 3);
        assert_eq!(result.report.skipped_nodata, 1);
        assert_eq!(result.report.duplicate_outlets, 1);
        assert_eq!(result.grid.to_vec(), vec![1, 1, UNASSIGNED, UNASSIGNED]);
    }

    #[test]
    fn test_nested_outlet_keeps_its_subtree() {
        let mut dirs = DirectionGrid::from_codes(1, 6, vec![E; 6]).unwrap();
        let outlets: OutletSet = vec![Outlet::new(0, 5, 1), Outlet::new(0, 2, 2)]
            .into_iter()
            .collect();

        for threads in [1, 4] {
            let params = WatershedParams { threads, ..Default::default() };
            let result = delineate_watersheds(&mut dirs, &outlets, &params).unwrap();
            assert_eq!(result.grid.to_vec(), vec![2, 2, 2, 1, 1, 1]);
            assert_eq!(result.report.conflicts, 0);
        }
    }

    #[test]
    fn test_raw_raster_entry_point() {
        let mut raw = Raster::from_vec(vec![8, 8, 8, 7], 2, 2).unwrap();
        raw.set_transform(GeoTransform::new(100.0, 200.0, 10.0, -10.0));

        // Degree45: 8 = E, 7 = SE
        let outlets = OutletSet::from_triples(&[(0, 1, 4)]);
        let out = watershed(&raw, DirectionFormat::Auto, &outlets, &WatershedParams::default())
            .unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 4);
        assert_eq!(out.get(1, 0).unwrap(), 0);
        assert_eq!(out.nodata(), Some(0));
        assert_eq!(out.transform(), raw.transform());
    }

    #[test]
    fn test_algorithm_trait() {
        let dirs = DirectionGrid::from_codes(1, 3, vec![E, E, W]).unwrap();
        let outlets = OutletSet::from_triples(&[(0, 1, 9)]);

        let result = Watershed.execute_default((dirs, outlets)).unwrap();
        assert_eq!(result.grid.to_vec(), vec![9, 9, 9]);
        assert_eq!(Watershed.name(), "Watershed");
    }

    #[test]
    fn test_with_outlets_leaves_input_untouched() {
        let dirs = DirectionGrid::from_codes(2, 1, vec![S, 0]).unwrap();
        let params = WatershedParams { strategy: MarkerStrategy::Packed, threads: 2 };

        let result = delineate_watersheds_with_outlets(&dirs, &[(1, 0, 5)], &params).unwrap();
        // The outlet is on no data
        assert_eq!(result.report.skipped_nodata, 1);
        assert_eq!(result.grid.assigned_count(), 0);
        assert_eq!(dirs.tagged_count(), 0);
    }
}
