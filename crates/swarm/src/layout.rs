//! Cell classification and process-neighbour topology.
//!
//! The swarm never decides geometry itself. A [`CellLayout`] maps coordinates
//! to cell indices and, for decomposed runs, describes which of this rank's
//! shadow cells mirror which neighbour's local cells.

use crate::{CellIndex, Coord, Rank};

/// One neighbouring rank and the cells shared with it.
///
/// `shadow_cells[k]` on this rank and `shadowed_cells[k]` on the neighbour
/// describe the same physical cell seen from both sides; `shadowed_cells`
/// here lists this rank's local cells that the neighbour shadows, in the
/// order the neighbour lists them as its own `shadow_cells`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborLink {
    /// Neighbour rank
    pub rank: Rank,
    /// This rank's shadow cells that mirror the neighbour's local cells
    pub shadow_cells: Vec<CellIndex>,
    /// This rank's local cells that appear as shadow cells on the neighbour
    pub shadowed_cells: Vec<CellIndex>,
}

/// Shadow-cell topology of one rank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShadowInfo {
    /// Immediate neighbours, each listed once
    pub neighbors: Vec<NeighborLink>,
}

impl ShadowInfo {
    /// Link for a given neighbour rank, if it is a neighbour.
    pub fn link(&self, rank: Rank) -> Option<&NeighborLink> {
        self.neighbors.iter().find(|l| l.rank == rank)
    }
}

/// Axis-aligned cell bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellBounds {
    /// Minimum corner
    pub min: Coord,
    /// Maximum corner
    pub max: Coord,
}

/// Classifies coordinates into this rank's local and shadow cells.
///
/// Cells `[0, local_cell_count)` are local, `[local_cell_count, domain_cell_count)`
/// are shadow cells. `cell_of` returns `domain_cell_count()` when no local or
/// shadow cell contains the point. Classifying the same coordinate twice must
/// yield the same cell.
pub trait CellLayout: Send {
    /// Number of cells owned by this rank.
    fn local_cell_count(&self) -> usize;

    /// Number of shadow cells mirroring neighbours' boundary cells.
    fn shadow_cell_count(&self) -> usize;

    /// Local plus shadow cells. Also the "outside" sentinel value.
    fn domain_cell_count(&self) -> usize {
        self.local_cell_count() + self.shadow_cell_count()
    }

    /// Cell containing `coord`, or `domain_cell_count()` if none does.
    fn cell_of(&self, coord: &Coord) -> CellIndex;

    /// Whether `coord` lies in `cell`.
    fn is_in_cell(&self, cell: CellIndex, coord: &Coord) -> bool;

    /// Neighbour topology. `None` for a layout that is not decomposed.
    fn shadow_info(&self) -> Option<&ShadowInfo> {
        None
    }

    /// Bounding box of a cell, if the layout can describe one.
    fn cell_bounds(&self, _cell: CellIndex) -> Option<CellBounds> {
        None
    }
}
