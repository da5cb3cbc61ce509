//! Orchestration Layer
//!
//! This crate drives the swarm core the way a simulation would:
//! - JSON run configuration with validation
//! - Slab decomposition of a regular grid into per-rank cell layouts
//! - Lattice particle placement
//! - Thread-per-rank advect-and-migrate runner

#![warn(missing_docs)]

pub mod config;
pub mod decomposition;
pub mod distributed;
pub mod error;
pub mod placement;

pub use config::RunConfig;
pub use decomposition::SlabLayout;
pub use distributed::{run_distributed, DistributedResult, RankSummary};
pub use error::OrchestratorError;

use std::path::Path;

/// Load a run configuration and execute it.
///
/// # Example
/// ```no_run
/// use orchestrator::run_from_config_file;
///
/// let result = run_from_config_file("configs/two-rank-drift.json")?;
/// println!("{} particles", result.total_particles());
/// # Ok::<(), orchestrator::OrchestratorError>(())
/// ```
pub fn run_from_config_file(
    config_path: impl AsRef<Path>,
) -> Result<DistributedResult, OrchestratorError> {
    let config_path = config_path.as_ref();
    tracing::info!("Loading run config: {}", config_path.display());

    let config = RunConfig::load(config_path)?;
    tracing::info!("Configuration loaded: {}", config.name);

    run_distributed(&config)
}
