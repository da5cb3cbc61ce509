//! Per-cell particle membership lists.
//!
//! Each cell keeps an unordered list of particle indices plus a logical
//! allocated size. Growth is lazy (the size steps up by a fixed delta only
//! when an add finds the list full); shrink is eager (the size drops to the
//! count as soon as the count falls exactly one delta below it).

use crate::error::{Result, SwarmError};
use crate::{CellIndex, ParticleIndex};

#[derive(Debug, Clone, Default)]
struct CellList {
    members: Vec<ParticleIndex>,
    size: usize,
}

/// Membership lists for local and shadow cells.
#[derive(Debug, Clone)]
pub struct CellTable {
    cells: Vec<CellList>,
    local_count: usize,
    delta: usize,
}

impl CellTable {
    /// One empty list per local and per shadow cell, in that index order.
    pub fn new(local_count: usize, shadow_count: usize, delta: usize) -> Result<Self> {
        if delta == 0 {
            return Err(SwarmError::InvalidConfig(
                "cell_particle_tbl_delta must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            cells: vec![CellList::default(); local_count + shadow_count],
            local_count,
            delta,
        })
    }

    /// Number of local cells.
    pub fn local_count(&self) -> usize {
        self.local_count
    }

    /// Number of local plus shadow cells. This is also the "outside the domain" sentinel.
    pub fn domain_count(&self) -> usize {
        self.cells.len()
    }

    /// Fixed growth step for every list.
    pub fn delta(&self) -> usize {
        self.delta
    }

    fn list(&self, cell: CellIndex) -> Result<&CellList> {
        self.cells
            .get(cell as usize)
            .ok_or(SwarmError::CellOutOfRange {
                cell,
                domain_count: self.cells.len(),
            })
    }

    fn list_mut(&mut self, cell: CellIndex) -> Result<&mut CellList> {
        let domain_count = self.cells.len();
        self.cells
            .get_mut(cell as usize)
            .ok_or(SwarmError::CellOutOfRange { cell, domain_count })
    }

    /// Members of a cell, in their current (unordered) order.
    pub fn particles(&self, cell: CellIndex) -> Result<&[ParticleIndex]> {
        Ok(&self.list(cell)?.members)
    }

    /// Number of particles in a cell.
    pub fn count(&self, cell: CellIndex) -> Result<usize> {
        Ok(self.list(cell)?.members.len())
    }

    /// Logical allocated size of a cell's list.
    pub fn size(&self, cell: CellIndex) -> Result<usize> {
        Ok(self.list(cell)?.size)
    }

    /// Append a particle to a cell's list, stepping the size up by one delta
    /// if the list is full.
    pub fn add(&mut self, cell: CellIndex, particle: ParticleIndex) -> Result<()> {
        let delta = self.delta;
        let list = self.list_mut(cell)?;
        if list.members.len() == list.size {
            list.size += delta;
            list.members.reserve_exact(list.size - list.members.len());
        }
        list.members.push(particle);
        Ok(())
    }

    /// Position of `particle` within the list of `cell`.
    pub fn index_within(&self, cell: CellIndex, particle: ParticleIndex) -> Result<usize> {
        let list = self.list(cell)?;
        list.members
            .iter()
            .position(|&p| p == particle)
            .ok_or(SwarmError::ParticleNotInCell {
                particle,
                cell,
                count: list.members.len(),
            })
    }

    /// Remove the entry at `position`, moving the last entry into its place.
    /// Returns the removed particle index.
    pub fn remove_at(&mut self, cell: CellIndex, position: usize) -> Result<ParticleIndex> {
        let delta = self.delta;
        let list = self.list_mut(cell)?;
        if position >= list.members.len() {
            return Err(SwarmError::Integrity(format!(
                "position {position} past the end of cell {cell} ({} members)",
                list.members.len()
            )));
        }
        let removed = list.members.swap_remove(position);
        if list.size >= delta && list.members.len() == list.size - delta {
            list.size = list.members.len();
            list.members.shrink_to(list.size);
        }
        Ok(removed)
    }

    /// Remove `particle` from `cell`.
    pub fn remove(&mut self, cell: CellIndex, particle: ParticleIndex) -> Result<()> {
        let position = self.index_within(cell, particle)?;
        self.remove_at(cell, position)?;
        Ok(())
    }

    /// Replace the entry for `from` with `to` in `cell`, keeping its position.
    pub fn replace(&mut self, cell: CellIndex, from: ParticleIndex, to: ParticleIndex) -> Result<()> {
        let position = self.index_within(cell, from)?;
        self.list_mut(cell)?.members[position] = to;
        Ok(())
    }

    /// Empty a cell and release its storage.
    pub fn clear_cell(&mut self, cell: CellIndex) -> Result<()> {
        let list = self.list_mut(cell)?;
        list.members = Vec::new();
        list.size = 0;
        Ok(())
    }

    /// Empty every cell.
    pub fn clear_all(&mut self) {
        for list in &mut self.cells {
            list.members = Vec::new();
            list.size = 0;
        }
    }

    /// Total number of entries across local cells.
    pub fn local_member_total(&self) -> usize {
        self.cells[..self.local_count]
            .iter()
            .map(|c| c.members.len())
            .sum()
    }

    /// Total number of entries across shadow cells.
    pub fn shadow_member_total(&self) -> usize {
        self.cells[self.local_count..]
            .iter()
            .map(|c| c.members.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_grows_by_delta_when_full() {
        let mut table = CellTable::new(2, 0, 4).unwrap();
        assert_eq!(table.size(0).unwrap(), 0);
        table.add(0, 10).unwrap();
        assert_eq!(table.size(0).unwrap(), 4);
        for p in 11..14 {
            table.add(0, p).unwrap();
        }
        assert_eq!(table.size(0).unwrap(), 4);
        table.add(0, 14).unwrap();
        assert_eq!(table.size(0).unwrap(), 8);
    }

    #[test]
    fn remove_swaps_last_into_place() {
        let mut table = CellTable::new(1, 0, 4).unwrap();
        for p in [5, 6, 7, 8] {
            table.add(0, p).unwrap();
        }
        table.remove(0, 6).unwrap();
        assert_eq!(table.particles(0).unwrap(), &[5, 8, 7]);
    }

    #[test]
    fn shrink_is_eager_at_one_delta_below() {
        let mut table = CellTable::new(1, 0, 4).unwrap();
        for p in 0..9 {
            table.add(0, p).unwrap();
        }
        assert_eq!(table.count(0).unwrap(), 9);
        assert_eq!(table.size(0).unwrap(), 12);
        table.remove(0, 8).unwrap();
        // count 8 == size 12 - delta 4
        assert_eq!(table.count(0).unwrap(), 8);
        assert_eq!(table.size(0).unwrap(), 8);
        // the next add must grow again
        table.add(0, 100).unwrap();
        assert_eq!(table.size(0).unwrap(), 12);
    }

    #[test]
    fn no_shrink_between_thresholds() {
        let mut table = CellTable::new(1, 0, 4).unwrap();
        for p in 0..8 {
            table.add(0, p).unwrap();
        }
        table.remove(0, 0).unwrap();
        // count 7, size 8: still above one delta below
        assert_eq!(table.size(0).unwrap(), 8);
    }

    #[test]
    fn removing_absent_particle_fails() {
        let mut table = CellTable::new(1, 0, 4).unwrap();
        table.add(0, 1).unwrap();
        assert!(matches!(
            table.remove(0, 2),
            Err(SwarmError::ParticleNotInCell {
                particle: 2,
                cell: 0,
                count: 1
            })
        ));
    }

    #[test]
    fn out_of_range_cell() {
        let table = CellTable::new(2, 1, 4).unwrap();
        assert!(table.count(2).is_ok());
        assert!(matches!(
            table.count(3),
            Err(SwarmError::CellOutOfRange {
                cell: 3,
                domain_count: 3
            })
        ));
    }

    #[test]
    fn clear_cell_releases_size() {
        let mut table = CellTable::new(1, 1, 4).unwrap();
        table.add(1, 3).unwrap();
        table.clear_cell(1).unwrap();
        assert_eq!(table.count(1).unwrap(), 0);
        assert_eq!(table.size(1).unwrap(), 0);
        assert_eq!(table.shadow_member_total(), 0);
    }

    #[test]
    fn zero_delta_rejected() {
        assert!(CellTable::new(1, 0, 0).is_err());
    }
}
