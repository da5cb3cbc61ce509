//! Swarm tuning parameters

use serde::{Deserialize, Serialize};

use crate::error::{Result, SwarmError};
use crate::store::GrowthPolicy;

/// Growth, validation and checking parameters for one swarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Fixed step by which each cell's particle list grows and shrinks
    pub cell_particle_tbl_delta: usize,
    /// Fraction of the live count used as particle store headroom
    pub extra_particles_factor: f64,
    /// Floor on the particle store growth step
    pub minimum_particles_delta: usize,
    /// Run the finite-coordinate sweep before every ownership update
    pub validate_coords: bool,
    /// Check global particle conservation after every migration pass
    pub defensive: bool,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            cell_particle_tbl_delta: 4,
            extra_particles_factor: 0.05,
            minimum_particles_delta: 100,
            validate_coords: true,
            defensive: true,
        }
    }
}

impl SwarmConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.cell_particle_tbl_delta == 0 {
            return Err(SwarmError::InvalidConfig(
                "cell_particle_tbl_delta must be at least 1".to_string(),
            ));
        }
        self.growth_policy()?;
        Ok(())
    }

    /// Particle store growth policy described by this configuration.
    pub fn growth_policy(&self) -> Result<GrowthPolicy> {
        GrowthPolicy::new(self.extra_particles_factor, self.minimum_particles_delta)
    }
}
