//! Slab decomposition of a regular grid
//!
//! The global grid is cut into contiguous slabs of x-columns, one slab per
//! rank. Each rank shadows the column just outside its slab on either side,
//! when a neighbour owns it.

use swarm::{CellBounds, CellIndex, CellLayout, Coord, NeighborLink, Rank, ShadowInfo};

use crate::config::DomainBounds;
use crate::error::OrchestratorError;

/// Columns `[start, end)` owned by `rank` when `columns` are split as evenly
/// as possible, earlier ranks taking the remainder.
pub fn column_range(rank: Rank, ranks: usize, columns: usize) -> (usize, usize) {
    let base = columns / ranks;
    let extra = columns % ranks;
    let start = rank * base + rank.min(extra);
    let width = base + usize::from(rank < extra);
    (start, start + width)
}

/// One rank's view of a slab-decomposed regular grid.
#[derive(Debug, Clone)]
pub struct SlabLayout {
    rank: Rank,
    domain: DomainBounds,
    grid: [usize; 3],
    cell_size: [f64; 3],
    /// First and one-past-last owned column
    columns: (usize, usize),
    left: bool,
    right: bool,
    shadow: ShadowInfo,
}

impl SlabLayout {
    /// Build the layout for `rank` of `ranks`.
    pub fn new(
        rank: Rank,
        ranks: usize,
        domain: DomainBounds,
        grid: [usize; 3],
    ) -> Result<Self, OrchestratorError> {
        if rank >= ranks || grid[0] < ranks || grid.iter().any(|&n| n == 0) {
            return Err(OrchestratorError::InvalidConfig(format!(
                "cannot give rank {rank} of {ranks} a slab of a {grid:?} grid"
            )));
        }
        let mut cell_size = [0.0; 3];
        for axis in 0..3 {
            cell_size[axis] = (domain.max[axis] - domain.min[axis]) / grid[axis] as f64;
        }
        let mut layout = Self {
            rank,
            domain,
            grid,
            cell_size,
            columns: column_range(rank, ranks, grid[0]),
            left: rank > 0,
            right: rank + 1 < ranks,
            shadow: ShadowInfo::default(),
        };
        layout.shadow = layout.build_shadow_info();
        tracing::debug!(
            "rank {}: columns {}..{}, {} local cells, {} shadow cells",
            rank,
            layout.columns.0,
            layout.columns.1,
            layout.local_cell_count(),
            layout.shadow_cell_count()
        );
        Ok(layout)
    }

    /// Owned column range.
    pub fn columns(&self) -> (usize, usize) {
        self.columns
    }

    fn plane(&self) -> usize {
        self.grid[1] * self.grid[2]
    }

    fn local_index(&self, ix: usize, iy: usize, iz: usize) -> CellIndex {
        (((ix - self.columns.0) * self.grid[1] + iy) * self.grid[2] + iz) as CellIndex
    }

    fn left_shadow(&self, iy: usize, iz: usize) -> CellIndex {
        (self.local_cell_count() + iy * self.grid[2] + iz) as CellIndex
    }

    fn right_shadow(&self, iy: usize, iz: usize) -> CellIndex {
        let left = if self.left { self.plane() } else { 0 };
        (self.local_cell_count() + left + iy * self.grid[2] + iz) as CellIndex
    }

    fn build_shadow_info(&self) -> ShadowInfo {
        let mut neighbors = Vec::new();
        let (x0, x1) = self.columns;
        let plane: Vec<(usize, usize)> = (0..self.grid[1])
            .flat_map(|iy| (0..self.grid[2]).map(move |iz| (iy, iz)))
            .collect();
        if self.left {
            neighbors.push(NeighborLink {
                rank: self.rank - 1,
                shadow_cells: plane.iter().map(|&(y, z)| self.left_shadow(y, z)).collect(),
                shadowed_cells: plane.iter().map(|&(y, z)| self.local_index(x0, y, z)).collect(),
            });
        }
        if self.right {
            neighbors.push(NeighborLink {
                rank: self.rank + 1,
                shadow_cells: plane.iter().map(|&(y, z)| self.right_shadow(y, z)).collect(),
                shadowed_cells: plane
                    .iter()
                    .map(|&(y, z)| self.local_index(x1 - 1, y, z))
                    .collect(),
            });
        }
        ShadowInfo { neighbors }
    }

    /// Global grid coordinates of the cell holding `coord`, if inside the domain.
    fn global_cell(&self, coord: &Coord) -> Option<[usize; 3]> {
        let mut ijk = [0usize; 3];
        for axis in 0..3 {
            let t = (coord[axis] - self.domain.min[axis]) / self.cell_size[axis];
            if self.grid[axis] == 1 && !self.cell_size[axis].is_normal() {
                // collapsed axis of a 2D run
                continue;
            }
            if !(t >= 0.0) || t >= self.grid[axis] as f64 {
                return None;
            }
            ijk[axis] = (t.floor() as usize).min(self.grid[axis] - 1);
        }
        Some(ijk)
    }

    /// Global grid coordinates of a local or shadow cell.
    fn cell_position(&self, cell: CellIndex) -> Option<[usize; 3]> {
        let cell = cell as usize;
        let local = self.local_cell_count();
        let plane = self.plane();
        if cell < local {
            let ix = cell / plane + self.columns.0;
            let rest = cell % plane;
            return Some([ix, rest / self.grid[2], rest % self.grid[2]]);
        }
        let mut offset = cell - local;
        if self.left {
            if offset < plane {
                return Some([self.columns.0 - 1, offset / self.grid[2], offset % self.grid[2]]);
            }
            offset -= plane;
        }
        if self.right && offset < plane {
            return Some([self.columns.1, offset / self.grid[2], offset % self.grid[2]]);
        }
        None
    }
}

impl CellLayout for SlabLayout {
    fn local_cell_count(&self) -> usize {
        (self.columns.1 - self.columns.0) * self.plane()
    }

    fn shadow_cell_count(&self) -> usize {
        (usize::from(self.left) + usize::from(self.right)) * self.plane()
    }

    fn cell_of(&self, coord: &Coord) -> CellIndex {
        let sentinel = self.domain_cell_count() as CellIndex;
        let Some([ix, iy, iz]) = self.global_cell(coord) else {
            return sentinel;
        };
        let (x0, x1) = self.columns;
        if ix >= x0 && ix < x1 {
            self.local_index(ix, iy, iz)
        } else if self.left && ix + 1 == x0 {
            self.left_shadow(iy, iz)
        } else if self.right && ix == x1 {
            self.right_shadow(iy, iz)
        } else {
            sentinel
        }
    }

    fn is_in_cell(&self, cell: CellIndex, coord: &Coord) -> bool {
        self.cell_of(coord) == cell
    }

    fn shadow_info(&self) -> Option<&ShadowInfo> {
        Some(&self.shadow)
    }

    fn cell_bounds(&self, cell: CellIndex) -> Option<CellBounds> {
        let ijk = self.cell_position(cell)?;
        let mut min = [0.0; 3];
        let mut max = [0.0; 3];
        for axis in 0..3 {
            min[axis] = self.domain.min[axis] + ijk[axis] as f64 * self.cell_size[axis];
            max[axis] = min[axis] + self.cell_size[axis];
        }
        Some(CellBounds { min, max })
    }
}
