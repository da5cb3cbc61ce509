//! Group-wide resolution of particles that left every known cell.
//!
//! Every rank contributes the records it could not place. All records are
//! gathered everywhere, each rank claims the ones its layout puts in a local
//! cell, and the claim flags are gathered again so that every rank can verify
//! that each particle found exactly one home.

use crate::error::{Result, SwarmError};
use crate::store::read_coord;
use crate::swarm::Swarm;
use crate::transport::{all_gather_u64, Transport};
use crate::ParticleIndex;

use super::slots::SlotPool;

/// Records whose owning cell is the sentinel, captured before their slots are
/// reused.
#[derive(Debug, Default)]
pub(crate) struct OutsideBatch {
    pub(crate) records: Vec<u8>,
    pub(crate) count: usize,
}

/// Outcome of one resolution round on this rank.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Resolution {
    /// Particles this rank sent for resolution
    pub(crate) sent: usize,
    /// Particles this rank claimed
    pub(crate) claimed: usize,
    /// Claimed particles that reused a vacated slot
    pub(crate) reused: usize,
    /// Unresolved particles across the whole group
    pub(crate) global_total: u64,
}

/// Copy out every sentinel-owned particle and release its slot.
pub(crate) fn scan(swarm: &Swarm) -> Result<(OutsideBatch, Vec<ParticleIndex>)> {
    let sentinel = swarm.sentinel();
    let mut batch = OutsideBatch::default();
    let mut vacated = Vec::new();
    for particle in 0..swarm.store.len() {
        if swarm.store.owning_cell(particle)? == sentinel {
            batch.records.extend_from_slice(swarm.store.record(particle)?);
            batch.count += 1;
            vacated.push(particle);
        }
    }
    Ok((batch, vacated))
}

/// Gather every rank's outside-domain particles, claim the local ones, and
/// check that each was claimed exactly once.
pub(crate) fn resolve(
    swarm: &mut Swarm,
    batch: OutsideBatch,
    pool: &mut SlotPool,
    transport: &dyn Transport,
) -> Result<Resolution> {
    let rank = transport.rank();
    let record_size = swarm.store.record_size();
    let counts = all_gather_u64(transport, batch.count as u64)?;
    let global_total: u64 = counts.iter().sum();
    let mut resolution = Resolution {
        sent: batch.count,
        global_total,
        ..Default::default()
    };
    if global_total == 0 {
        return Ok(resolution);
    }
    tracing::debug!(
        "rank {}: resolving {} outside-domain particles group-wide ({} from here)",
        rank,
        global_total,
        batch.count
    );

    let gathered = transport.all_gather(&batch.records)?;
    for (origin, (payload, &count)) in gathered.iter().zip(&counts).enumerate() {
        let expected = count as usize * record_size;
        if payload.len() != expected {
            return Err(SwarmError::CountMismatch {
                rank,
                peer: origin,
                what: "outside-domain record bytes",
                expected,
                received: payload.len(),
            });
        }
    }

    let local = swarm.local_cell_count();
    let mut claims = Vec::with_capacity(global_total as usize);
    for payload in &gathered {
        for record in payload.chunks_exact(record_size) {
            let coord = read_coord(swarm.store.schema(), record);
            let cell = swarm.layout.cell_of(&coord);
            if (cell as usize) < local {
                let slot = pool.take();
                if slot.is_some() {
                    resolution.reused += 1;
                }
                swarm.place_record(slot, record, cell)?;
                resolution.claimed += 1;
                claims.push(1u8);
            } else {
                claims.push(0u8);
            }
        }
    }

    let all_claims = transport.all_gather(&claims)?;
    let mut flat = 0;
    for (origin, (payload, &count)) in gathered.iter().zip(&counts).enumerate() {
        for index in 0..count as usize {
            let tally: u32 = all_claims
                .iter()
                .map(|c| c.get(flat).copied().unwrap_or(0) as u32)
                .sum();
            if tally != 1 {
                let record = &payload[index * record_size..(index + 1) * record_size];
                let coord = read_coord(swarm.store.schema(), record);
                if tally == 0 {
                    tracing::error!(
                        "rank {}: particle {} from rank {} at {:?} was not claimed by any rank",
                        rank,
                        index,
                        origin,
                        coord
                    );
                    return Err(SwarmError::ParticleUnclaimed {
                        origin,
                        index,
                        coord,
                    });
                }
                return Err(SwarmError::ParticleClaimedTwice {
                    origin,
                    index,
                    coord,
                    claims: tally,
                });
            }
            flat += 1;
        }
    }
    Ok(resolution)
}
