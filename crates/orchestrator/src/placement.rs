//! Initial particle placement

use swarm::{CellIndex, FieldKind, RecordSchema, Swarm, SwarmError};

/// Extension field recording the rank a particle was placed on.
pub const ORIGIN_RANK_FIELD: &str = "origin_rank";

/// Record layout used by the runner: coordinate, owning cell, origin rank.
pub fn run_schema(dim: usize) -> Result<RecordSchema, SwarmError> {
    RecordSchema::new(dim)?.with_field(ORIGIN_RANK_FIELD, FieldKind::U32, 1)
}

/// Fill every local cell with a regular lattice of `per_axis` particles per
/// axis, tagged with `rank`. Returns the number of particles placed.
pub fn place_lattice(swarm: &mut Swarm, per_axis: usize, rank: u32) -> Result<usize, SwarmError> {
    let dim = swarm.store().schema().dim();
    let origin = swarm
        .store()
        .schema()
        .require_field(ORIGIN_RANK_FIELD)?
        .clone();
    let per_cell = per_axis.pow(dim as u32);
    let mut placed = 0;

    for cell in 0..swarm.local_cell_count() as CellIndex {
        let bounds = swarm.cell_bounds(cell).ok_or_else(|| {
            SwarmError::Integrity(format!("cell {cell} has no bounds to place particles in"))
        })?;
        for n in 0..per_cell {
            let mut coord = [0.0; 3];
            let mut rest = n;
            for axis in 0..dim {
                let i = rest % per_axis;
                rest /= per_axis;
                let frac = (i as f64 + 0.5) / per_axis as f64;
                coord[axis] = bounds.min[axis] + frac * (bounds.max[axis] - bounds.min[axis]);
            }
            match swarm.insert_particle(&coord[..dim])? {
                Some(particle) => {
                    swarm.write_field(particle, &origin, 0, rank)?;
                    placed += 1;
                }
                None => tracing::warn!(
                    "lattice point {:?} of cell {} classified outside the local cells",
                    coord,
                    cell
                ),
            }
        }
    }

    tracing::debug!(
        "swarm '{}': placed {} particles ({} per cell)",
        swarm.name(),
        placed,
        per_cell
    );
    Ok(placed)
}
