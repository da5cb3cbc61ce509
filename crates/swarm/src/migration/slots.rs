//! Free-slot pool and tail compaction.

use std::collections::{BTreeSet, VecDeque};

use crate::error::{Result, SwarmError};
use crate::swarm::Swarm;
use crate::ParticleIndex;

/// Store slots vacated during one pass, handed out lowest first.
#[derive(Debug, Default)]
pub(crate) struct SlotPool {
    free: VecDeque<ParticleIndex>,
}

impl SlotPool {
    /// Merge the slots vacated by shadow sends and by outside-domain
    /// particles. A slot vacated twice means a particle was listed twice.
    pub(crate) fn new(
        mut shadow_vacated: Vec<ParticleIndex>,
        outside_vacated: Vec<ParticleIndex>,
    ) -> Result<Self> {
        shadow_vacated.extend(outside_vacated);
        shadow_vacated.sort_unstable();
        if let Some(pair) = shadow_vacated.windows(2).find(|w| w[0] == w[1]) {
            return Err(SwarmError::Integrity(format!(
                "particle {} vacated twice in one migration pass",
                pair[0]
            )));
        }
        Ok(Self {
            free: shadow_vacated.into(),
        })
    }

    /// Next free slot, if any remain.
    pub(crate) fn take(&mut self) -> Option<ParticleIndex> {
        self.free.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.free.len()
    }

    /// Slots nobody reused; these become holes for compaction.
    pub(crate) fn into_holes(self) -> BTreeSet<ParticleIndex> {
        self.free.into_iter().collect()
    }
}

/// Close every hole by moving the highest live record into the lowest hole,
/// then drop the tail. Returns the number of records moved.
pub(crate) fn compact(swarm: &mut Swarm, mut holes: BTreeSet<ParticleIndex>) -> Result<usize> {
    let sentinel = swarm.sentinel();
    let mut count = swarm.store.len();
    let mut moved = 0;
    while let Some(hole) = holes.pop_first() {
        // holes sitting at the tail vanish with it
        while count > 0 && holes.remove(&(count - 1)) {
            count -= 1;
        }
        if hole + 1 >= count {
            count = count.min(hole);
            continue;
        }
        let last = count - 1;
        let cell = swarm.store.owning_cell(last)?;
        if cell >= sentinel {
            return Err(SwarmError::Integrity(format!(
                "live particle {last} has no cell during compaction"
            )));
        }
        swarm.store.copy_within(last, hole)?;
        swarm.cells.replace(cell, last, hole)?;
        count -= 1;
        moved += 1;
    }
    swarm.store.truncate(count);
    Ok(moved)
}
