//! Neighbour migration through shadow cells.
//!
//! A particle that moved into one of this rank's shadow cells now sits in a
//! neighbour's local cell. It is packed into that neighbour's batch, its slot
//! is released, and the neighbour receives it after a counts-then-data
//! exchange.

use std::collections::HashSet;

use crate::error::{Result, SwarmError};
use crate::layout::{NeighborLink, ShadowInfo};
use crate::store::read_coord;
use crate::swarm::Swarm;
use crate::transport::{decode, encode, Tag, Transport};
use crate::{CellIndex, ParticleIndex, Rank};

use super::slots::SlotPool;

/// Records leaving for one neighbour.
#[derive(Debug)]
pub(crate) struct OutgoingBatch {
    pub(crate) rank: Rank,
    /// Particles per shadow cell, in the link's `shadow_cells` order
    pub(crate) counts: Vec<u32>,
    /// Packed records, grouped by shadow cell in the same order
    pub(crate) records: Vec<u8>,
}

impl OutgoingBatch {
    pub(crate) fn total(&self) -> usize {
        self.counts.iter().map(|&c| c as usize).sum()
    }
}

/// Records arriving from one neighbour.
#[derive(Debug)]
pub(crate) struct IncomingBatch {
    pub(crate) rank: Rank,
    /// Particles per shadowed local cell, in the link's `shadowed_cells` order
    pub(crate) counts: Vec<u32>,
    pub(crate) records: Vec<u8>,
}

impl IncomingBatch {
    fn total(&self) -> usize {
        self.counts.iter().map(|&c| c as usize).sum()
    }
}

/// Reject topologies where a neighbour appears twice or a shadow cell is
/// shared by two neighbours.
pub(crate) fn check_topology(info: &ShadowInfo, swarm: &Swarm, rank: Rank) -> Result<()> {
    let mut ranks = HashSet::new();
    let mut shadow_cells = HashSet::new();
    let local = swarm.local_cell_count() as CellIndex;
    let sentinel = swarm.sentinel();
    for link in &info.neighbors {
        if link.rank == rank || !ranks.insert(link.rank) {
            return Err(SwarmError::Integrity(format!(
                "rank {rank}: neighbour rank {} listed twice or as itself",
                link.rank
            )));
        }
        for &cell in &link.shadow_cells {
            if cell < local || cell >= sentinel {
                return Err(SwarmError::Integrity(format!(
                    "rank {rank}: cell {cell} listed as a shadow cell for rank {} is not a shadow cell",
                    link.rank
                )));
            }
            if !shadow_cells.insert(cell) {
                return Err(SwarmError::Integrity(format!(
                    "rank {rank}: shadow cell {cell} mapped to more than one neighbour"
                )));
            }
        }
        if let Some(&cell) = link.shadowed_cells.iter().find(|&&c| c >= local) {
            return Err(SwarmError::Integrity(format!(
                "rank {rank}: cell {cell} shadowed by rank {} is not a local cell",
                link.rank
            )));
        }
    }
    Ok(())
}

/// Pack every particle filed under a shadow cell and release its slot.
/// Returns one batch per neighbour plus the vacated slots.
pub(crate) fn scan(
    swarm: &mut Swarm,
    info: &ShadowInfo,
) -> Result<(Vec<OutgoingBatch>, Vec<ParticleIndex>)> {
    let sentinel = swarm.sentinel();
    let mut batches = Vec::with_capacity(info.neighbors.len());
    let mut vacated = Vec::new();
    for link in &info.neighbors {
        let mut batch = OutgoingBatch {
            rank: link.rank,
            counts: Vec::with_capacity(link.shadow_cells.len()),
            records: Vec::new(),
        };
        for &cell in &link.shadow_cells {
            let members = swarm.cells.particles(cell)?.to_vec();
            batch.counts.push(members.len() as u32);
            for particle in members {
                batch.records.extend_from_slice(swarm.store.record(particle)?);
                swarm.store.set_owning_cell(particle, sentinel)?;
                vacated.push(particle);
            }
            swarm.cells.clear_cell(cell)?;
        }
        batches.push(batch);
    }
    let stranded = swarm.cells.shadow_member_total();
    if stranded != 0 {
        return Err(SwarmError::Integrity(format!(
            "{stranded} particles in shadow cells that no neighbour mirrors"
        )));
    }
    Ok((batches, vacated))
}

/// Send per-shadow-cell counts to every neighbour and receive theirs.
pub(crate) fn exchange_counts(
    info: &ShadowInfo,
    outgoing: &[OutgoingBatch],
    transport: &dyn Transport,
) -> Result<Vec<Vec<u32>>> {
    let rank = transport.rank();
    for batch in outgoing {
        transport.send(batch.rank, Tag::ShadowCounts, encode(&batch.counts))?;
    }
    info.neighbors
        .iter()
        .map(|link| {
            let counts = decode::<u32>(rank, &transport.recv(link.rank, Tag::ShadowCounts)?)?;
            if counts.len() != link.shadowed_cells.len() {
                return Err(SwarmError::CountMismatch {
                    rank,
                    peer: link.rank,
                    what: "shadow cell counts",
                    expected: link.shadowed_cells.len(),
                    received: counts.len(),
                });
            }
            Ok(counts)
        })
        .collect()
}

/// Post every non-empty send and receive, then wait for all of them.
pub(crate) fn exchange_records(
    info: &ShadowInfo,
    outgoing: Vec<OutgoingBatch>,
    incoming_counts: Vec<Vec<u32>>,
    record_size: usize,
    transport: &dyn Transport,
) -> Result<Vec<IncomingBatch>> {
    let mut sends = Vec::new();
    for batch in outgoing {
        if batch.total() > 0 {
            sends.push(transport.isend(batch.rank, Tag::ShadowParticles, batch.records)?);
        }
    }

    let mut batches: Vec<IncomingBatch> = info
        .neighbors
        .iter()
        .zip(incoming_counts)
        .map(|(link, counts)| IncomingBatch {
            rank: link.rank,
            counts,
            records: Vec::new(),
        })
        .collect();
    let mut posted = Vec::new();
    let mut recvs = Vec::new();
    for (i, batch) in batches.iter().enumerate() {
        let total = batch.total();
        if total > 0 {
            recvs.push(transport.irecv(batch.rank, Tag::ShadowParticles, total * record_size));
            posted.push(i);
        }
    }

    let payloads = transport.wait_all(sends, recvs)?;
    for (i, payload) in posted.into_iter().zip(payloads) {
        batches[i].records = payload;
    }
    Ok(batches)
}

/// File every received particle under a local cell, reusing vacated slots
/// before growing the store. Returns the number of particles placed and how
/// many of them reused a slot.
pub(crate) fn integrate(
    swarm: &mut Swarm,
    info: &ShadowInfo,
    incoming: &[IncomingBatch],
    pool: &mut SlotPool,
    rank: Rank,
) -> Result<(usize, usize)> {
    let record_size = swarm.store.record_size();
    let local = swarm.local_cell_count();
    let mut placed = 0;
    let mut reused = 0;
    for (link, batch) in info.neighbors.iter().zip(incoming) {
        let mut records = batch.records.chunks_exact(record_size);
        for (k, &count) in batch.counts.iter().enumerate() {
            for _ in 0..count {
                let record = records.next().ok_or_else(|| short_batch(rank, link))?;
                let coord = read_coord(swarm.store.schema(), record);
                let mut cell = swarm.layout.cell_of(&coord);
                if cell as usize >= local {
                    let fallback = link.shadowed_cells[k];
                    tracing::warn!(
                        "particle from rank {} at {:?} does not classify into a local cell, filing under cell {}",
                        link.rank,
                        coord,
                        fallback
                    );
                    cell = fallback;
                }
                let slot = pool.take();
                if slot.is_some() {
                    reused += 1;
                }
                swarm.place_record(slot, record, cell)?;
                placed += 1;
            }
        }
    }
    Ok((placed, reused))
}

fn short_batch(rank: Rank, link: &NeighborLink) -> SwarmError {
    SwarmError::ProtocolViolation {
        rank,
        detail: format!(
            "batch from rank {} shorter than its announced counts",
            link.rank
        ),
    }
}
