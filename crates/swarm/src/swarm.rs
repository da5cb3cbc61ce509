//! The `Swarm` aggregate: particle store and cell index kept in lock-step.
//!
//! Every live particle index appears in exactly one cell list, the one named
//! by its `owning_cell` field. The only exception is a particle whose owning
//! cell is the sentinel (`domain_cell_count`): it belongs to no list and is
//! waiting for the migration pass to find it a home.

use crate::cell_table::CellTable;
use crate::config::SwarmConfig;
use crate::error::{Result, SwarmError};
use crate::layout::{CellBounds, CellLayout};
use crate::migration::{MigrationHandler, MigrationReport};
use crate::record::{FieldSpec, RecordSchema, OWNING_CELL_FIELD};
use crate::store::{ParticleStore, Realloc};
use crate::transport::Transport;
use crate::{CellIndex, Coord, ParticleIndex};

/// One rank's share of a particle population.
pub struct Swarm {
    name: String,
    pub(crate) store: ParticleStore,
    pub(crate) cells: CellTable,
    pub(crate) layout: Box<dyn CellLayout>,
    pub(crate) config: SwarmConfig,
    still_initialising: bool,
    migration: MigrationHandler,
}

impl std::fmt::Debug for Swarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swarm")
            .field("name", &self.name)
            .field("count", &self.store.len())
            .field("capacity", &self.store.capacity())
            .field("local_cells", &self.cells.local_count())
            .field("domain_cells", &self.cells.domain_count())
            .finish()
    }
}

impl Swarm {
    /// Create an empty swarm over `layout`.
    pub fn new(
        name: impl Into<String>,
        schema: RecordSchema,
        layout: Box<dyn CellLayout>,
        config: SwarmConfig,
    ) -> Result<Self> {
        config.validate()?;
        let cells = CellTable::new(
            layout.local_cell_count(),
            layout.shadow_cell_count(),
            config.cell_particle_tbl_delta,
        )?;
        let store = ParticleStore::new(schema, config.growth_policy()?);
        let name = name.into();
        tracing::debug!(
            "swarm '{}': {} local cells, {} shadow cells, {} byte records",
            name,
            cells.local_count(),
            cells.domain_count() - cells.local_count(),
            store.record_size()
        );
        Ok(Self {
            name,
            store,
            cells,
            layout,
            config,
            still_initialising: true,
            migration: MigrationHandler::default(),
        })
    }

    /// Build a swarm around an existing store, reconstructing the cell index
    /// from each record's owning cell. The store adopts the growth policy of
    /// `config`.
    pub fn from_store(
        name: impl Into<String>,
        store: ParticleStore,
        layout: Box<dyn CellLayout>,
        config: SwarmConfig,
    ) -> Result<Self> {
        let mut swarm = Self::new(name, store.schema().clone(), layout, config)?;
        let policy = swarm.store.policy();
        swarm.store = store;
        swarm.store.set_policy(policy);
        swarm.rebuild_cell_index()?;
        swarm.still_initialising = false;
        Ok(swarm)
    }

    /// Value copy of this swarm over a fresh layout. Records are copied as
    /// bytes and the cell index is rebuilt.
    pub fn duplicate(&self, name: impl Into<String>, layout: Box<dyn CellLayout>) -> Result<Self> {
        Self::from_store(name, self.store.clone(), layout, self.config.clone())
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Swarm name, used in log output.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of live particles.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Return `true` if the swarm holds no particles.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Allocated particle slots.
    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    /// Read-only view of the particle store.
    pub fn store(&self) -> &ParticleStore {
        &self.store
    }

    /// Read-only view of the cell index.
    pub fn cells(&self) -> &CellTable {
        &self.cells
    }

    /// The cell classifier.
    pub fn layout(&self) -> &dyn CellLayout {
        self.layout.as_ref()
    }

    /// Tuning parameters.
    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    /// Number of local cells.
    pub fn local_cell_count(&self) -> usize {
        self.cells.local_count()
    }

    /// Owning-cell value meaning "outside every known cell".
    pub fn sentinel(&self) -> CellIndex {
        self.cells.domain_count() as CellIndex
    }

    /// Whether the first ownership pass has not completed yet.
    pub fn is_initialising(&self) -> bool {
        self.still_initialising
    }

    /// Migration handler, with statistics of past passes.
    pub fn migration(&self) -> &MigrationHandler {
        &self.migration
    }

    /// Coordinate of a particle.
    pub fn coord(&self, particle: ParticleIndex) -> Result<Coord> {
        self.store.coord(particle)
    }

    /// Move a particle. Ownership is not recomputed until the next update.
    pub fn set_coord(&mut self, particle: ParticleIndex, coord: &[f64]) -> Result<()> {
        self.store.set_coord(particle, coord)
    }

    /// Owning cell of a particle.
    pub fn owning_cell(&self, particle: ParticleIndex) -> Result<CellIndex> {
        self.store.owning_cell(particle)
    }

    /// Read one component of an extension field.
    pub fn read_field<T: bytemuck::Pod>(
        &self,
        particle: ParticleIndex,
        field: &FieldSpec,
        component: usize,
    ) -> Result<T> {
        self.store.read_field(particle, field, component)
    }

    /// Write one component of an extension field.
    pub fn write_field<T: bytemuck::Pod>(
        &mut self,
        particle: ParticleIndex,
        field: &FieldSpec,
        component: usize,
        value: T,
    ) -> Result<()> {
        if field.name == OWNING_CELL_FIELD {
            return Err(SwarmError::InvalidConfig(format!(
                "'{OWNING_CELL_FIELD}' is maintained by the cell index and cannot be written directly"
            )));
        }
        self.store.write_field(particle, field, component, value)
    }

    /// Bounding box of a cell, if the layout provides one.
    pub fn cell_bounds(&self, cell: CellIndex) -> Option<CellBounds> {
        self.layout.cell_bounds(cell)
    }

    // -----------------------------------------------------------------------
    // Cell index mutation
    // -----------------------------------------------------------------------

    /// Append `particle` to `cell`'s list and record `cell` as its owner.
    pub fn add_particle_to_cell(&mut self, cell: CellIndex, particle: ParticleIndex) -> Result<()> {
        self.store.owning_cell(particle)?;
        self.cells.add(cell, particle)?;
        self.store.set_owning_cell(particle, cell)
    }

    /// Remove the entry at `position` of `cell`'s list and return the particle
    /// it held. The record, including its owning cell, is left untouched; the
    /// caller re-files the particle or overwrites it.
    pub fn remove_particle_from_cell(
        &mut self,
        cell: CellIndex,
        position: usize,
    ) -> Result<ParticleIndex> {
        self.cells.remove_at(cell, position)
    }

    /// Position of `particle` within `cell`'s list.
    pub fn particle_index_within_cell(
        &self,
        cell: CellIndex,
        particle: ParticleIndex,
    ) -> Result<usize> {
        self.cells.index_within(cell, particle)
    }

    fn unlist(&mut self, particle: ParticleIndex) -> Result<()> {
        let cell = self.store.owning_cell(particle)?;
        if cell != self.sentinel() {
            let position = self.cells.index_within(cell, particle)?;
            self.cells.remove_at(cell, position)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Particle store mutation
    // -----------------------------------------------------------------------

    /// Append a zeroed particle at the end of the store. Its owning cell is
    /// the sentinel until it is added to a cell.
    pub fn create_new_particle(&mut self) -> Result<ParticleIndex> {
        let particle = self.store.extend_one();
        let sentinel = self.sentinel();
        self.store.set_owning_cell(particle, sentinel)?;
        Ok(particle)
    }

    /// Create a particle at `coord` and file it under its local cell.
    /// Returns `None`, creating nothing, if `coord` is not in a local cell.
    pub fn insert_particle(&mut self, coord: &[f64]) -> Result<Option<ParticleIndex>> {
        let mut padded = [0.0; 3];
        for (dst, src) in padded.iter_mut().zip(coord) {
            *dst = *src;
        }
        let cell = self.layout.cell_of(&padded);
        if cell as usize >= self.cells.local_count() {
            return Ok(None);
        }
        let particle = self.create_new_particle()?;
        self.store.set_coord(particle, coord)?;
        self.add_particle_to_cell(cell, particle)?;
        Ok(Some(particle))
    }

    /// Remove a particle entirely. The last live record is moved into the
    /// vacated slot, so the previous last index stops being valid.
    pub fn delete_particle(&mut self, particle: ParticleIndex) -> Result<()> {
        self.unlist(particle)?;
        let last = self.store.len() - 1;
        if particle != last {
            let moved_cell = self.store.owning_cell(last)?;
            self.store.copy_within(last, particle)?;
            if moved_cell != self.sentinel() {
                self.cells.replace(moved_cell, last, particle)?;
            }
        }
        tracing::trace!("swarm '{}': deleted particle {}", self.name, particle);
        self.store.truncate(last);
        self.store.realloc();
        Ok(())
    }

    /// Overwrite a particle in place with `record` and file it under `cell`.
    /// Nothing is moved and the store does not shrink.
    pub fn delete_and_replace(
        &mut self,
        particle: ParticleIndex,
        record: &[u8],
        cell: CellIndex,
    ) -> Result<()> {
        self.unlist(particle)?;
        self.store.write_record(particle, record)?;
        let sentinel = self.sentinel();
        self.store.set_owning_cell(particle, sentinel)?;
        if cell != sentinel {
            self.add_particle_to_cell(cell, particle)?;
        }
        Ok(())
    }

    /// Place a full record into `slot`, or into a new slot at the end of the
    /// store if none is given, filed under `cell`.
    pub(crate) fn place_record(
        &mut self,
        slot: Option<ParticleIndex>,
        record: &[u8],
        cell: CellIndex,
    ) -> Result<ParticleIndex> {
        let particle = match slot {
            Some(slot) => slot,
            None => {
                let slot = self.store.push_slot();
                let sentinel = self.sentinel();
                self.store.set_owning_cell(slot, sentinel)?;
                slot
            }
        };
        self.delete_and_replace(particle, record, cell)?;
        Ok(particle)
    }

    /// Apply the store's reallocation policy once.
    pub fn realloc_store(&mut self) -> Realloc {
        self.store.realloc()
    }

    // -----------------------------------------------------------------------
    // Ownership
    // -----------------------------------------------------------------------

    /// Recompute the owning cell of one particle from its coordinate.
    ///
    /// A particle that lands in a shadow cell is filed in that shadow cell's
    /// list; one that lands nowhere gets the sentinel and leaves every list.
    pub fn update_owner(&mut self, particle: ParticleIndex) -> Result<()> {
        let coord = self.store.coord(particle)?;
        let old = self.store.owning_cell(particle)?;
        let new = self.layout.cell_of(&coord);
        let sentinel = self.sentinel();
        if new > sentinel {
            return Err(SwarmError::CellOutOfRange {
                cell: new,
                domain_count: self.cells.domain_count(),
            });
        }
        if new == old {
            return Ok(());
        }
        self.unlist(particle)?;
        if new == sentinel {
            self.store.set_owning_cell(particle, sentinel)?;
        } else {
            self.add_particle_to_cell(new, particle)?;
        }
        tracing::trace!(
            "swarm '{}': particle {} moved from cell {} to {}",
            self.name,
            particle,
            old,
            new
        );
        Ok(())
    }

    /// Classify every particle once, without migration, ending the
    /// initialisation phase. Every particle must land in a local cell.
    pub fn initialise(&mut self) -> Result<()> {
        for particle in 0..self.store.len() {
            self.update_owner(particle)?;
        }
        let local = self.cells.local_member_total();
        if local != self.store.len() {
            return Err(SwarmError::Integrity(format!(
                "swarm '{}': {} of {} particles placed outside the local cells",
                self.name,
                self.store.len() - local,
                self.store.len()
            )));
        }
        self.still_initialising = false;
        tracing::info!(
            "swarm '{}' initialised with {} particles in {} cells",
            self.name,
            self.store.len(),
            self.cells.local_count()
        );
        Ok(())
    }

    /// Recompute every particle's owner, then run one migration pass.
    ///
    /// Coordinates are checked first when `validate_coords` is set. While the
    /// swarm is still initialising no migration is run and `None` is returned.
    pub fn update_all_owners(
        &mut self,
        transport: &dyn Transport,
    ) -> Result<Option<MigrationReport>> {
        if self.config.validate_coords {
            self.check_coords_are_finite()?;
        }
        for particle in 0..self.store.len() {
            self.update_owner(particle)?;
        }
        if self.still_initialising {
            self.still_initialising = false;
            return Ok(None);
        }
        self.handle_particle_movement_between_processes(transport)
            .map(Some)
    }

    /// Run one migration pass for particles already filed under shadow cells
    /// or the sentinel.
    pub fn handle_particle_movement_between_processes(
        &mut self,
        transport: &dyn Transport,
    ) -> Result<MigrationReport> {
        let mut handler = std::mem::take(&mut self.migration);
        let outcome = handler.run(self, transport);
        self.migration = handler;
        outcome
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Closest particle to `coord` among the members of `cell`.
    pub fn find_closest_particle_in_cell(
        &self,
        cell: CellIndex,
        coord: &Coord,
    ) -> Result<Option<ParticleIndex>> {
        let dim = self.store.schema().dim();
        let mut best: Option<(ParticleIndex, f64)> = None;
        for &particle in self.cells.particles(cell)? {
            let p = self.store.coord(particle)?;
            let dist2: f64 = (0..dim).map(|a| (p[a] - coord[a]).powi(2)).sum();
            if best.map_or(true, |(_, d)| dist2 < d) {
                best = Some((particle, dist2));
            }
        }
        Ok(best.map(|(particle, _)| particle))
    }

    /// Closest particle to `coord` within the local cell containing it.
    /// `None` if `coord` is not in a local cell or that cell is empty.
    pub fn find_closest_particle(&self, coord: &Coord) -> Result<Option<ParticleIndex>> {
        let cell = self.layout.cell_of(coord);
        if cell as usize >= self.cells.local_count() {
            return Ok(None);
        }
        self.find_closest_particle_in_cell(cell, coord)
    }

    // -----------------------------------------------------------------------
    // Validation and diagnostics
    // -----------------------------------------------------------------------

    /// Fail on the first particle with a NaN or infinite coordinate component.
    pub fn check_coords_are_finite(&self) -> Result<()> {
        let dim = self.store.schema().dim();
        for particle in 0..self.store.len() {
            let coord = self.store.coord(particle)?;
            if coord[..dim].iter().any(|c| !c.is_finite()) {
                tracing::error!(
                    "swarm '{}': particle {} has non-finite coordinate {:?}",
                    self.name,
                    particle,
                    coord
                );
                return Err(SwarmError::NonFiniteCoordinate { particle, coord });
            }
        }
        Ok(())
    }

    /// Verify that every live particle is listed exactly once, in the cell
    /// its record names, and that no shadow cell holds particles.
    pub fn check_packing_invariant(&self) -> Result<()> {
        let count = self.store.len();
        let mut seen = vec![0u32; count];
        for cell in 0..self.cells.domain_count() as CellIndex {
            for &particle in self.cells.particles(cell)? {
                if particle >= count {
                    return Err(SwarmError::Integrity(format!(
                        "cell {cell} lists particle {particle} beyond live count {count}"
                    )));
                }
                let owner = self.store.owning_cell(particle)?;
                if owner != cell {
                    return Err(SwarmError::Integrity(format!(
                        "cell {cell} lists particle {particle} whose owning cell is {owner}"
                    )));
                }
                seen[particle] += 1;
            }
        }
        let shadowed = self.cells.shadow_member_total();
        if shadowed != 0 {
            return Err(SwarmError::Integrity(format!(
                "{shadowed} particles left in shadow cells"
            )));
        }
        if let Some(particle) = seen.iter().position(|&n| n != 1) {
            return Err(SwarmError::Integrity(format!(
                "particle {particle} appears in {} cell lists",
                seen[particle]
            )));
        }
        Ok(())
    }

    /// Rebuild every cell list from the records' owning-cell fields.
    pub fn rebuild_cell_index(&mut self) -> Result<()> {
        self.cells.clear_all();
        let sentinel = self.sentinel();
        for particle in 0..self.store.len() {
            let cell = self.store.owning_cell(particle)?;
            if cell < sentinel {
                self.cells.add(cell, particle)?;
            } else if cell > sentinel {
                return Err(SwarmError::CellOutOfRange {
                    cell,
                    domain_count: self.cells.domain_count(),
                });
            }
        }
        Ok(())
    }

    /// Log every particle's coordinate in store order at debug level.
    pub fn log_particle_coords(&self) -> Result<()> {
        tracing::debug!("swarm '{}': {} particles", self.name, self.store.len());
        for particle in 0..self.store.len() {
            tracing::debug!("  particle {}: {:?}", particle, self.store.coord(particle)?);
        }
        Ok(())
    }

    /// Log particle coordinates grouped by local cell at debug level.
    pub fn log_particle_coords_by_cell(&self) -> Result<()> {
        for cell in 0..self.cells.local_count() as CellIndex {
            let members = self.cells.particles(cell)?;
            tracing::debug!("swarm '{}': cell {} has {} particles", self.name, cell, members.len());
            for (position, &particle) in members.iter().enumerate() {
                tracing::debug!(
                    "  [{}] particle {}: {:?}",
                    position,
                    particle,
                    self.store.coord(particle)?
                );
            }
        }
        Ok(())
    }
}
