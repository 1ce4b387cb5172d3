//! Upstream tracing from a single outlet
//!
//! Walks the reversed D8 graph from an outlet towards its sources, claiming
//! every cell whose flow ends up in the outlet.
//!
//! The walk descends one channel at a time. At a confluence (more than one
//! unclaimed neighbor draining into the current cell) the first branch is
//! followed and the confluence cell is pushed on an explicit stack. When a
//! ridge is reached (nothing drains into the current cell any more) the most
//! recent confluence is popped and scanned again; branches already walked are
//! claimed by then, so the scan picks up the next one. The native call stack
//! never grows with basin size; the explicit stack holds only confluences
//! with branches left.

use super::marker::MarkerStore;
use catchment_core::raster::direction::{INFLOW_CODES, NODATA, OFFSETS};
use catchment_core::{DirectionGrid, Outlet, WatershedGrid, UNASSIGNED};

/// Counters for one outlet's traversal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceStats {
    /// Cells claimed upstream of the outlet (the outlet itself excluded)
    pub cells: usize,
    /// Confluence cells pushed for later backtracking
    pub confluences: usize,
    /// Deepest the confluence stack got
    pub max_stack: usize,
    /// Claims refused because another outlet already owned the cell
    pub conflicts: usize,
}

impl TraceStats {
    /// Combine the counters of two traversals
    pub fn merge(self, other: TraceStats) -> TraceStats {
        TraceStats {
            cells: self.cells + other.cells,
            confluences: self.confluences + other.confluences,
            max_stack: self.max_stack.max(other.max_stack),
            conflicts: self.conflicts + other.conflicts,
        }
    }
}

/// Result of seeding an outlet cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// The outlet cell now carries the outlet's id
    Claimed,
    /// The outlet sits on a no-data cell; nothing to trace
    NoData,
    /// Another outlet already claimed this cell
    AlreadyClaimed,
}

/// Tracer over one shared direction grid, marker store and output grid.
///
/// A tracer holds only shared references and is `Sync` whenever the marker
/// store is, so one instance serves every worker of a run.
pub struct UpstreamTracer<'a, M: MarkerStore> {
    dirs: &'a DirectionGrid,
    markers: &'a M,
    output: &'a WatershedGrid,
}

impl<'a, M: MarkerStore> UpstreamTracer<'a, M> {
    pub fn new(dirs: &'a DirectionGrid, markers: &'a M, output: &'a WatershedGrid) -> Self {
        debug_assert_eq!(dirs.shape(), markers.shape());
        debug_assert_eq!(dirs.shape(), output.shape());
        Self {
            dirs,
            markers,
            output,
        }
    }

    /// Mark (row, col) visited and assign `id`; `false` if already claimed.
    #[inline]
    fn claim(&self, row: usize, col: usize, id: u32) -> bool {
        if !self.markers.try_claim(row, col) {
            return false;
        }
        // A fresh claim always finds an unwritten cell
        debug_assert_eq!(self.output.id(row, col), UNASSIGNED);
        self.output.set(row, col, id);
        true
    }

    /// Claim the outlet cell itself.
    pub fn seed(&self, outlet: &Outlet) -> SeedOutcome {
        if self.dirs.code(outlet.row, outlet.col) == NODATA {
            SeedOutcome::NoData
        } else if self.claim(outlet.row, outlet.col, outlet.id) {
            SeedOutcome::Claimed
        } else {
            SeedOutcome::AlreadyClaimed
        }
    }

    /// First unclaimed neighbor draining into (row, col), and whether any
    /// other one exists.
    #[inline]
    fn scan(&self, row: usize, col: usize) -> Option<((usize, usize), bool)> {
        let mut first = None;

        for (&(dr, dc), &inflow) in OFFSETS.iter().zip(INFLOW_CODES.iter()) {
            let (Some(nr), Some(nc)) = (row.checked_add_signed(dr), col.checked_add_signed(dc))
            else {
                continue;
            };
            if !self.dirs.contains(nr, nc)
                || self.dirs.code(nr, nc) != inflow
                || self.markers.is_claimed(nr, nc)
            {
                continue;
            }
            if first.is_some() {
                return first.map(|cell| (cell, true));
            }
            first = Some((nr, nc));
        }

        first.map(|cell| (cell, false))
    }

    /// Claim everything upstream of an already seeded cell with `id`.
    pub fn trace(&self, row: usize, col: usize, id: u32) -> TraceStats {
        let mut stats = TraceStats::default();
        let mut confluences: Vec<(usize, usize)> = Vec::new();
        let (mut row, mut col) = (row, col);

        loop {
            match self.scan(row, col) {
                // Ridge: resume at the latest confluence, or finish
                None => match confluences.pop() {
                    Some(cell) => (row, col) = cell,
                    None => break,
                },
                Some(((nr, nc), more)) => {
                    if !self.claim(nr, nc, id) {
                        // Lost the cell to another outlet; rescan without it
                        stats.conflicts += 1;
                        continue;
                    }
                    stats.cells += 1;
                    if more {
                        confluences.push((row, col));
                        stats.confluences += 1;
                        stats.max_stack = stats.max_stack.max(confluences.len());
                    }
                    (row, col) = (nr, nc);
                }
            }
        }

        stats
    }

    /// Seed and trace one outlet; `None` if it was not seeded.
    pub fn delineate(&self, outlet: &Outlet) -> Option<TraceStats> {
        match self.seed(outlet) {
            SeedOutcome::Claimed => Some(self.trace(outlet.row, outlet.col, outlet.id)),
            SeedOutcome::NoData | SeedOutcome::AlreadyClaimed => None,
        }
    }
}
