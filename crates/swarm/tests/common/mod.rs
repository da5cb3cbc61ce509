//! Shared fixtures: a strip of unit cells along x split evenly across ranks.

#![allow(dead_code)]

use std::thread;

use swarm::{
    CellIndex, CellLayout, Coord, LocalGroup, LocalTransport, NeighborLink, RecordSchema,
    ShadowInfo, Swarm, SwarmConfig,
};

/// Rank `rank` owns columns `[rank * width, (rank + 1) * width)` and shadows
/// the column on either side that belongs to a neighbour.
pub struct Strip {
    rank: usize,
    width: usize,
    left: bool,
    right: bool,
    info: ShadowInfo,
}

impl Strip {
    pub fn new(rank: usize, ranks: usize, width: usize) -> Self {
        let left = rank > 0;
        let right = rank + 1 < ranks;
        let mut neighbors = Vec::new();
        if left {
            neighbors.push(NeighborLink {
                rank: rank - 1,
                shadow_cells: vec![width as CellIndex],
                shadowed_cells: vec![0],
            });
        }
        if right {
            neighbors.push(NeighborLink {
                rank: rank + 1,
                shadow_cells: vec![(width + left as usize) as CellIndex],
                shadowed_cells: vec![(width - 1) as CellIndex],
            });
        }
        Self {
            rank,
            width,
            left,
            right,
            info: ShadowInfo { neighbors },
        }
    }

    fn first_column(&self) -> i64 {
        (self.rank * self.width) as i64
    }
}

impl CellLayout for Strip {
    fn local_cell_count(&self) -> usize {
        self.width
    }

    fn shadow_cell_count(&self) -> usize {
        self.left as usize + self.right as usize
    }

    fn cell_of(&self, coord: &Coord) -> CellIndex {
        let sentinel = self.domain_cell_count() as CellIndex;
        if !coord[0].is_finite() || coord[1] < 0.0 || coord[1] >= 1.0 {
            return sentinel;
        }
        let column = coord[0].floor() as i64 - self.first_column();
        let width = self.width as i64;
        if (0..width).contains(&column) {
            column as CellIndex
        } else if column == -1 && self.left {
            self.width as CellIndex
        } else if column == width && self.right {
            (self.width + self.left as usize) as CellIndex
        } else {
            sentinel
        }
    }

    fn is_in_cell(&self, cell: CellIndex, coord: &Coord) -> bool {
        self.cell_of(coord) == cell
    }

    fn shadow_info(&self) -> Option<&ShadowInfo> {
        Some(&self.info)
    }
}

pub fn strip_swarm(rank: usize, ranks: usize, width: usize, config: SwarmConfig) -> Swarm {
    Swarm::new(
        format!("strip-{rank}"),
        RecordSchema::new(2).unwrap(),
        Box::new(Strip::new(rank, ranks, width)),
        config,
    )
    .unwrap()
}

/// Run `body` once per rank on its own thread and collect the results in
/// rank order.
pub fn run_ranks<T, F>(ranks: usize, body: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(LocalTransport) -> T + Send + Sync + Clone + 'static,
{
    let handles: Vec<_> = LocalGroup::new(ranks)
        .into_transports()
        .into_iter()
        .map(|transport| {
            let body = body.clone();
            thread::spawn(move || body(transport))
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

/// Sorted x coordinates of every live particle.
pub fn xs(swarm: &Swarm) -> Vec<f64> {
    let mut xs: Vec<f64> = (0..swarm.len()).map(|p| swarm.coord(p).unwrap()[0]).collect();
    xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
    xs
}

/// Cells given as half-open x intervals: local cells first, then shadow
/// cells, with an explicit neighbour topology. Lets a test give two ranks
/// layouts that disagree.
pub struct Intervals {
    pub local: Vec<(f64, f64)>,
    pub shadow: Vec<(f64, f64)>,
    pub info: ShadowInfo,
}

impl CellLayout for Intervals {
    fn local_cell_count(&self) -> usize {
        self.local.len()
    }

    fn shadow_cell_count(&self) -> usize {
        self.shadow.len()
    }

    fn cell_of(&self, coord: &Coord) -> CellIndex {
        let x = coord[0];
        self.local
            .iter()
            .chain(&self.shadow)
            .position(|&(lo, hi)| x >= lo && x < hi)
            .unwrap_or(self.local.len() + self.shadow.len()) as CellIndex
    }

    fn is_in_cell(&self, cell: CellIndex, coord: &Coord) -> bool {
        self.cell_of(coord) == cell
    }

    fn shadow_info(&self) -> Option<&ShadowInfo> {
        Some(&self.info)
    }
}

pub fn link(rank: usize, shadow_cells: &[CellIndex], shadowed_cells: &[CellIndex]) -> NeighborLink {
    NeighborLink {
        rank,
        shadow_cells: shadow_cells.to_vec(),
        shadowed_cells: shadowed_cells.to_vec(),
    }
}

pub fn interval_swarm(rank: usize, layout: Intervals) -> Swarm {
    Swarm::new(
        format!("intervals-{rank}"),
        RecordSchema::new(2).unwrap(),
        Box::new(layout),
        SwarmConfig::default(),
    )
    .unwrap()
}
