//! End-to-end delineation tests.
//!
//! Small hand-built networks check exact labels; a larger pseudo-random
//! drainage forest is checked against a brute-force downstream walk.

use catchment_algorithms::hydrology::{
    delineate_watersheds, watershed, MarkerStrategy, WatershedParams,
};
use catchment_core::io::{read_geotiff, write_geotiff};
use catchment_core::raster::direction::{NODATA, OFFSETS};
use catchment_core::raster::Direction;
use catchment_core::{
    DirectionFormat, DirectionGrid, Error, GeoTransform, Outlet, OutletSet, Raster, UNASSIGNED,
};
use std::collections::HashMap;

const E: u8 = 1;
const S: u8 = 4;
const W: u8 = 16;
const N: u8 = 64;

fn params(strategy: MarkerStrategy, threads: usize) -> WatershedParams {
    WatershedParams { strategy, threads }
}

fn every_config() -> Vec<WatershedParams> {
    let mut configs = Vec::new();
    for strategy in [MarkerStrategy::Separate, MarkerStrategy::Packed] {
        for threads in [1, 2, 4, 0] {
            configs.push(params(strategy, threads));
        }
    }
    configs
}

// ---------------------------------------------------------------------------
// Hand-built networks
// ---------------------------------------------------------------------------

#[test]
fn single_row_drains_to_outlet() {
    let mut dirs = DirectionGrid::from_codes(1, 5, vec![E; 5]).unwrap();
    let outlets = OutletSet::from_triples(&[(0, 4, 1)]);

    let result = delineate_watersheds(&mut dirs, &outlets, &WatershedParams::default()).unwrap();
    assert_eq!(result.grid.to_vec(), vec![1, 1, 1, 1, 1]);
}

#[test]
fn two_branches_meet_at_outlet() {
    // Branches of three cells from each side meet at the outlet in the middle
    let codes = vec![E, E, E, S, W, W, W];
    let outlets = OutletSet::from_triples(&[(0, 3, 5)]);

    for config in every_config() {
        let mut dirs = DirectionGrid::from_codes(1, 7, codes.clone()).unwrap();
        let result = delineate_watersheds(&mut dirs, &outlets, &config).unwrap();
        assert_eq!(result.grid.to_vec(), vec![5; 7], "{:?}", config);
        assert_eq!(result.report.assigned_cells, 7);
        assert_eq!(result.report.max_stack_depth, 1);
    }
}

#[test]
fn corner_outlets_are_disjoint() {
    // Left half drains to the bottom-left corner, right half to the top-right
    #[rustfmt::skip]
    let codes = vec![
        S, S, E, E,
        S, S, N, N,
        S, S, N, N,
        W, W, N, N,
    ];
    let outlets = OutletSet::from_triples(&[(3, 0, 1), (0, 3, 2)]);
    #[rustfmt::skip]
    let expected = vec![
        1, 1, 2, 2,
        1, 1, 2, 2,
        1, 1, 2, 2,
        1, 1, 2, 2,
    ];

    for config in every_config() {
        let mut dirs = DirectionGrid::from_codes(4, 4, codes.clone()).unwrap();
        let result = delineate_watersheds(&mut dirs, &outlets, &config).unwrap();
        assert_eq!(result.grid.to_vec(), expected, "{:?}", config);
        assert_eq!(result.report.conflicts, 0);
    }
}

#[test]
fn illegal_code_fails_before_tracing() {
    let mut raw = Raster::from_vec(vec![1, 1, 1, 1, 1, 1, 1, 200, 1], 3, 3).unwrap();
    raw.set_nodata(Some(-1));
    let outlets = OutletSet::from_triples(&[(0, 2, 1)]);

    let err = watershed(&raw, DirectionFormat::Power2, &outlets, &WatershedParams::default())
        .unwrap_err();
    assert!(
        matches!(err, Error::InvalidDirectionCode { row: 2, col: 1, value: 200 }),
        "unexpected error: {err}"
    );
    assert!(DirectionGrid::from_codes(1, 2, vec![1, 3]).is_err());
}

#[test]
fn nested_outlet_keeps_upstream_cells() {
    // Column 1 drains south; (2,1) is an inner outlet above the main one
    #[rustfmt::skip]
    let codes = vec![
        0, S, 0,
        E, S, W,
        0, S, 0,
        E, S, W,
        0, S, 0,
    ];
    #[rustfmt::skip]
    let expected = vec![
        0, 2, 0,
        2, 2, 2,
        0, 2, 0,
        1, 1, 1,
        0, 1, 0,
    ];

    for config in every_config() {
        // Listing order must not matter
        for triples in [[(4, 1, 1), (2, 1, 2)], [(2, 1, 2), (4, 1, 1)]] {
            let mut dirs = DirectionGrid::from_codes(5, 3, codes.clone()).unwrap();
            let outlets = OutletSet::from_triples(&triples);
            let result = delineate_watersheds(&mut dirs, &outlets, &config).unwrap();
            assert_eq!(result.grid.to_vec(), expected, "{:?} {:?}", config, triples);
        }
    }
}

#[test]
fn packed_strategy_restores_directions() {
    // Outlet 3 at the top-right corner sits upstream of outlet 4 below it
    let codes = vec![E, E, S, W, 0, S, N, N, W];
    let original = DirectionGrid::from_codes(3, 3, codes).unwrap();
    let mut dirs = original.clone();
    let outlets = OutletSet::from_triples(&[(0, 2, 3), (2, 2, 4)]);

    let packed = delineate_watersheds(&mut dirs, &outlets, &params(MarkerStrategy::Packed, 2))
        .unwrap();
    assert_eq!(dirs.tagged_count(), 0);
    assert_eq!(dirs, original);

    let separate =
        delineate_watersheds(&mut dirs, &outlets, &params(MarkerStrategy::Separate, 2)).unwrap();
    assert_eq!(packed.grid, separate.grid);
    assert_eq!(packed.report, separate.report);
}

#[test]
fn rerun_gives_same_labels() {
    let mut forest = Forest::generate(40, 50, 0x5eed);
    let outlets = forest.outlets(30, 7);
    let mut dirs = forest.grid();

    let first = delineate_watersheds(&mut dirs, &outlets, &params(MarkerStrategy::Packed, 0))
        .unwrap();
    let second = delineate_watersheds(&mut dirs, &outlets, &params(MarkerStrategy::Packed, 0))
        .unwrap();
    assert_eq!(first.grid, second.grid);
    assert_eq!(first.report, second.report);
}

#[test]
fn result_survives_geotiff_round_trip() {
    let mut dirs = DirectionGrid::from_codes(2, 3, vec![E, E, S, 0, 0, 0]).unwrap();
    let transform = GeoTransform::new(500.0, 1000.0, 25.0, -25.0);
    dirs.set_transform(transform);
    let outlets = OutletSet::from_triples(&[(0, 2, 12)]);

    let result = delineate_watersheds(&mut dirs, &outlets, &WatershedParams::default()).unwrap();
    let raster = result.to_raster(dirs.transform()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("basins.tif");
    write_geotiff(&raster, &path, None).unwrap();
    let back: Raster<u32> = read_geotiff(&path).unwrap();

    assert_eq!(back.shape(), (2, 3));
    assert_eq!(back.get(0, 0).unwrap(), 12);
    assert_eq!(back.get(1, 0).unwrap(), UNASSIGNED);
    assert_eq!(back.nodata(), Some(UNASSIGNED));
    assert_eq!(back.transform(), &transform);
}

#[test]
fn float_direction_raster_with_fraction_is_rejected() {
    let raster = Raster::from_vec(vec![90.7_f32, 3.0e9, 360.0, 180.0], 2, 2).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dirs.tif");
    write_geotiff(&raster, &path, None).unwrap();

    let err = read_geotiff::<i32, _>(&path).unwrap_err();
    assert!(
        matches!(err, Error::InvalidSample { row: 0, col: 0, .. }),
        "unexpected error: {err}"
    );
}

#[test]
fn map_outlets_resolve_on_georeferenced_input() {
    // Degrees: 360 = E, 270 = S
    let mut raw = Raster::from_vec(vec![360, 270, -1, 360], 2, 2).unwrap();
    raw.set_transform(GeoTransform::new(1000.0, 2000.0, 10.0, -10.0));
    raw.set_nodata(Some(-1));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dirs.tif");
    write_geotiff(&raw, &path, None).unwrap();
    let back: Raster<i32> = read_geotiff(&path).unwrap();
    assert_eq!(back.transform(), raw.transform());

    let (mut dirs, format) = DirectionGrid::from_raster(&back, DirectionFormat::Auto).unwrap();
    assert_eq!(format, DirectionFormat::Degree);
    // Centre of cell (1, 1)
    let outlets = OutletSet::from_coords(dirs.transform(), 2, 2, &[(1015.0, 1985.0, 3)]).unwrap();
    assert_eq!(outlets[0], Outlet::new(1, 1, 3));

    let result = delineate_watersheds(&mut dirs, &outlets, &WatershedParams::default()).unwrap();
    assert_eq!(result.grid.to_vec(), vec![3, 3, UNASSIGNED, 3]);
}

// ---------------------------------------------------------------------------
// Random drainage forest against a downstream-walk oracle
// ---------------------------------------------------------------------------

/// Linear congruential generator; enough for repeatable test terrain
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }
}

/// D8 network derived by steepest descent over a tilted noisy surface.
/// Every cell drains to a strictly lower neighbor, so the network is a
/// forest; pits carry no data.
struct Forest {
    rows: usize,
    cols: usize,
    codes: Vec<u8>,
    rng: Lcg,
}

impl Forest {
    fn generate(rows: usize, cols: usize, seed: u64) -> Self {
        let mut rng = Lcg(seed);
        let elevation: Vec<f64> = (0..rows * cols)
            .map(|i| (i / cols + i % cols) as f64 * 2.0 + (rng.next() % 1000) as f64 / 100.0)
            .collect();

        let mut codes = vec![NODATA; rows * cols];
        for row in 0..rows {
            for col in 0..cols {
                let here = elevation[row * cols + col];
                let mut best: Option<(f64, Direction)> = None;
                for (dir, &(dr, dc)) in Direction::ALL.iter().zip(OFFSETS.iter()) {
                    let (Some(nr), Some(nc)) =
                        (row.checked_add_signed(dr), col.checked_add_signed(dc))
                    else {
                        continue;
                    };
                    if nr >= rows || nc >= cols {
                        continue;
                    }
                    let z = elevation[nr * cols + nc];
                    if z < here && best.map_or(true, |(b, _)| z < b) {
                        best = Some((z, *dir));
                    }
                }
                if let Some((_, dir)) = best {
                    codes[row * cols + col] = dir.code();
                }
            }
        }

        Self { rows, cols, codes, rng }
    }

    fn grid(&self) -> DirectionGrid {
        DirectionGrid::from_codes(self.rows, self.cols, self.codes.clone()).unwrap()
    }

    /// `count` outlets at distinct random cells, ids starting at `first_id`
    fn outlets(&mut self, count: usize, first_id: u32) -> OutletSet {
        let mut taken = HashMap::new();
        let mut set = OutletSet::new();
        let mut id = first_id;
        while set.len() < count {
            let cell = (self.rng.below(self.rows), self.rng.below(self.cols));
            if taken.insert(cell, id).is_none() {
                set.push(Outlet::new(cell.0, cell.1, id));
                id += 1;
            }
        }
        set
    }

    /// Follow each cell downstream until an outlet, no data or the edge.
    fn oracle(&self, outlets: &OutletSet) -> Vec<u32> {
        let dirs = self.grid();
        let mut at = HashMap::new();
        for outlet in outlets {
            at.entry((outlet.row, outlet.col)).or_insert(outlet.id);
        }

        let mut labels = Vec::with_capacity(self.rows * self.cols);
        for row in 0..self.rows {
            for col in 0..self.cols {
                let mut cell = Some((row, col));
                let mut label = UNASSIGNED;
                while let Some((r, c)) = cell {
                    if dirs.code(r, c) == NODATA {
                        break;
                    }
                    if let Some(&id) = at.get(&(r, c)) {
                        label = id;
                        break;
                    }
                    cell = dirs.downstream(r, c);
                }
                labels.push(label);
            }
        }
        labels
    }
}

#[test]
fn random_forest_matches_oracle() {
    for seed in [1, 42, 2024] {
        let mut forest = Forest::generate(60, 80, seed);
        let outlets = forest.outlets(40, 1);
        let expected = forest.oracle(&outlets);
        assert!(
            expected.iter().any(|&id| id != UNASSIGNED),
            "seed {} produced an empty labeling",
            seed
        );

        for config in every_config() {
            let mut dirs = forest.grid();
            let result = delineate_watersheds(&mut dirs, &outlets, &config).unwrap();
            assert_eq!(result.grid.to_vec(), expected, "seed {} {:?}", seed, config);
            assert_eq!(result.report.conflicts, 0);
            assert_eq!(
                result.report.assigned_cells,
                expected.iter().filter(|&&id| id != UNASSIGNED).count()
            );
        }
    }
}

#[test]
fn outlet_order_does_not_matter() {
    let mut forest = Forest::generate(50, 50, 7);
    let outlets = forest.outlets(60, 100);
    let reversed: OutletSet = outlets.iter().rev().copied().collect();

    let mut dirs = forest.grid();
    let forward =
        delineate_watersheds(&mut dirs, &outlets, &params(MarkerStrategy::Separate, 4)).unwrap();
    let backward =
        delineate_watersheds(&mut dirs, &reversed, &params(MarkerStrategy::Packed, 3)).unwrap();
    assert_eq!(forward.grid, backward.grid);
}
