//! Typed errors for swarm bookkeeping and particle migration.
//!
//! Every variant is fatal for the operation that raised it. Nothing in this
//! crate retries: a dropped or duplicated particle is worse than an aborted
//! pass, so callers propagate with `?` and stop the run.

use thiserror::Error;

use crate::{CellIndex, ParticleIndex, Rank};

/// Crate result type
pub type Result<T> = std::result::Result<T, SwarmError>;

/// Errors raised by the swarm, its migration handler, or the transport.
#[derive(Debug, Error)]
pub enum SwarmError {
    /// Inconsistent construction parameters (growth factor, deltas, schema).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A particle index at or past the live count.
    #[error("particle index {index} out of range (local count {count})")]
    ParticleOutOfRange {
        /// Offending index
        index: ParticleIndex,
        /// Live particle count
        count: usize,
    },

    /// A cell index past the local plus shadow cells.
    #[error("cell index {cell} out of range (domain cell count {domain_count})")]
    CellOutOfRange {
        /// Offending cell
        cell: CellIndex,
        /// Local plus shadow cell count
        domain_count: usize,
    },

    /// Removal of a particle its cell does not list.
    #[error("particle {particle} not found among the {count} particles of cell {cell}")]
    ParticleNotInCell {
        /// Particle that was looked up
        particle: ParticleIndex,
        /// Cell searched
        cell: CellIndex,
        /// Entries in that cell
        count: usize,
    },

    /// NaN or infinite coordinate with coordinate validation on.
    #[error("coordinate of particle {particle} is not finite: {coord:?}")]
    NonFiniteCoordinate {
        /// Particle carrying the coordinate
        particle: ParticleIndex,
        /// Coordinate, unused axes zero
        coord: [f64; 3],
    },

    /// Packing or ownership invariant broken.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// A message whose length disagrees with what was announced.
    #[error("rank {rank}: expected {expected} {what} from rank {peer}, received {received}")]
    CountMismatch {
        /// Receiving rank
        rank: Rank,
        /// Sending rank
        peer: Rank,
        /// What was being counted
        what: &'static str,
        /// Announced length
        expected: usize,
        /// Length actually received
        received: usize,
    },

    /// Inconsistent neighbour topology or message ordering.
    #[error("protocol violation on rank {rank}: {detail}")]
    ProtocolViolation {
        /// Rank that detected it
        rank: Rank,
        /// What went wrong
        detail: String,
    },

    /// An outside-domain particle no rank accepted.
    #[error("particle {index} sent by rank {origin} at {coord:?} was not claimed by any rank")]
    ParticleUnclaimed {
        /// Rank that sent it for resolution
        origin: Rank,
        /// Position within that rank's batch
        index: usize,
        /// Its coordinate
        coord: [f64; 3],
    },

    /// An outside-domain particle accepted by more than one rank.
    #[error("particle {index} sent by rank {origin} at {coord:?} was claimed by {claims} ranks")]
    ParticleClaimedTwice {
        /// Rank that sent it for resolution
        origin: Rank,
        /// Position within that rank's batch
        index: usize,
        /// Its coordinate
        coord: [f64; 3],
        /// Number of claiming ranks
        claims: u32,
    },

    /// Group-wide particle total differs before and after a pass.
    #[error("global particle count changed across migration: {before} before, {after} after")]
    ConservationViolated {
        /// Total entering the pass
        before: u64,
        /// Total leaving the pass
        after: u64,
    },

    /// Send, receive or collective failure, including a vanished peer.
    #[error("transport failure on rank {rank}: {detail}")]
    Transport {
        /// Rank that observed the failure
        rank: Rank,
        /// Underlying cause
        detail: String,
    },
}
