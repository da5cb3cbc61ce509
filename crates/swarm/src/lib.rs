//! Particle-in-cell bookkeeping
//!
//! This crate tracks which spatial cell owns each particle of a population,
//! keeps the per-cell index packed, and moves particles between ranks of a
//! decomposed domain when they cross a subdomain boundary.
//!
//! # Modules
//! - [`record`] -- Fixed-size record layout with named, typed fields.
//! - [`store`] -- Contiguous particle storage and its growth policy.
//! - [`cell_table`] -- Per-cell particle index lists.
//! - [`layout`] -- `CellLayout` trait for coordinate classification and neighbour topology.
//! - [`swarm`] -- The `Swarm` aggregate keeping store and index in lock-step.
//! - [`transport`] -- Rank-addressed message passing, with an in-process implementation.
//! - [`migration`] -- The inter-rank particle migration pass.
//! - [`config`] -- Tuning parameters.

#![warn(missing_docs)]

pub mod cell_table;
pub mod config;
pub mod error;
pub mod layout;
pub mod migration;
pub mod record;
pub mod store;
pub mod swarm;
pub mod transport;

pub use cell_table::CellTable;
pub use config::SwarmConfig;
pub use error::{Result, SwarmError};
pub use layout::{CellBounds, CellLayout, NeighborLink, ShadowInfo};
pub use migration::{MigrationHandler, MigrationReport};
pub use record::{FieldKind, FieldSpec, RecordSchema};
pub use store::{GrowthPolicy, ParticleStore, Realloc};
pub use swarm::Swarm;
pub use transport::{LocalGroup, LocalTransport, Tag, Transport};

/// Index of a cell within one rank's domain (local cells first, then shadow cells)
pub type CellIndex = u32;

/// Position of a particle record in the particle store
pub type ParticleIndex = usize;

/// Rank of a process within the group
pub type Rank = usize;

/// Spatial coordinate; the z component is zero for 2D swarms
pub type Coord = [f64; 3];
