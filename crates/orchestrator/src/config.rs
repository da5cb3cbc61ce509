//! Run configuration parsing and validation

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use swarm::SwarmConfig;

use crate::error::OrchestratorError;

/// Main run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Human-readable run name
    pub name: String,
    /// Spatial dimension (2 or 3)
    #[serde(default = "default_dim")]
    pub dim: usize,
    /// Global domain bounds
    pub domain: DomainBounds,
    /// Global cell grid resolution per axis (z is ignored in 2D)
    pub cells: [usize; 3],
    /// Number of ranks the domain is split across (along x)
    pub ranks: usize,
    /// Particles per cell along each axis at start
    #[serde(default = "default_particles_per_axis")]
    pub particles_per_axis: usize,
    /// Number of advect-and-migrate steps
    pub steps: u64,
    /// Timestep (seconds)
    pub dt: f64,
    /// Prescribed velocity field
    pub velocity: VelocityField,
    /// What happens to particles advected past the domain bounds
    #[serde(default)]
    pub boundary: BoundaryMode,
    /// Swarm tuning
    #[serde(default)]
    pub swarm: SwarmConfig,
}

/// Domain bounding box
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DomainBounds {
    /// Minimum corner [x, y, z]
    pub min: [f64; 3],
    /// Maximum corner [x, y, z]
    pub max: [f64; 3],
}

/// Prescribed particle velocity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VelocityField {
    /// Same velocity everywhere
    Uniform {
        /// Velocity [vx, vy, vz]
        velocity: [f64; 3],
    },
    /// Rigid rotation about an axis parallel to z
    Rotation {
        /// Point on the rotation axis
        centre: [f64; 3],
        /// Angular velocity (rad/s, counter-clockwise)
        angular_velocity: f64,
    },
}

impl VelocityField {
    /// Velocity at `coord`.
    pub fn at(&self, coord: &[f64; 3]) -> [f64; 3] {
        match *self {
            VelocityField::Uniform { velocity } => velocity,
            VelocityField::Rotation {
                centre,
                angular_velocity,
            } => [
                -angular_velocity * (coord[1] - centre[1]),
                angular_velocity * (coord[0] - centre[0]),
                0.0,
            ],
        }
    }
}

/// Boundary treatment for advected particles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryMode {
    /// Wrap around to the opposite face
    #[default]
    Periodic,
    /// Stop at the face
    Clamp,
}

fn default_dim() -> usize {
    2
}

fn default_particles_per_axis() -> usize {
    2
}

impl RunConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OrchestratorError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| OrchestratorError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let config: RunConfig = serde_json::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        let invalid = |msg: String| Err(OrchestratorError::InvalidConfig(msg));

        if self.dim != 2 && self.dim != 3 {
            return invalid(format!("dim must be 2 or 3, got {}", self.dim));
        }

        for axis in 0..self.dim {
            if self.domain.min[axis] >= self.domain.max[axis] {
                return invalid(format!("domain min must be less than max on axis {axis}"));
            }
            if self.cells[axis] == 0 {
                return invalid(format!("cells must be at least 1 on axis {axis}"));
            }
        }

        if self.ranks == 0 {
            return invalid("ranks must be at least 1".to_string());
        }
        if self.cells[0] < self.ranks {
            return invalid(format!(
                "{} cell columns cannot be split across {} ranks",
                self.cells[0], self.ranks
            ));
        }

        if self.particles_per_axis == 0 {
            return invalid("particles_per_axis must be at least 1".to_string());
        }

        if !(self.dt > 0.0) {
            return invalid("dt must be positive".to_string());
        }

        self.swarm
            .validate()
            .map_err(|e| OrchestratorError::InvalidConfig(e.to_string()))?;

        Ok(())
    }

    /// Grid resolution with unused axes collapsed to one cell.
    pub fn grid(&self) -> [usize; 3] {
        let mut grid = self.cells;
        for n in grid.iter_mut().skip(self.dim) {
            *n = 1;
        }
        grid
    }

    /// Cell edge length per axis.
    pub fn cell_size(&self) -> [f64; 3] {
        let grid = self.grid();
        let mut size = [1.0; 3];
        for axis in 0..self.dim {
            size[axis] = (self.domain.max[axis] - self.domain.min[axis]) / grid[axis] as f64;
        }
        size
    }

    /// Domain bounds with unused axes collapsed to zero width.
    pub fn effective_domain(&self) -> DomainBounds {
        let mut domain = self.domain;
        for axis in self.dim..3 {
            domain.min[axis] = 0.0;
            domain.max[axis] = 0.0;
        }
        domain
    }

    /// Particle count at start across all ranks.
    pub fn initial_particle_count(&self) -> usize {
        let grid = self.grid();
        let cells: usize = grid.iter().product();
        cells * self.particles_per_axis.pow(self.dim as u32)
    }
}
