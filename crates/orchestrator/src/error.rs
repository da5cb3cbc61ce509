//! Orchestration errors

use thiserror::Error;

use swarm::{Rank, SwarmError};

/// Errors raised while configuring or running a distributed swarm.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path as given
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for a run.
    #[error("failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration parsed but is inconsistent.
    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    /// A rank aborted with a swarm error.
    #[error("rank {rank} failed: {source}")]
    Rank {
        /// Rank that failed
        rank: Rank,
        /// Error raised on that rank
        #[source]
        source: SwarmError,
    },

    /// A rank's thread panicked.
    #[error("rank {0} thread panicked")]
    RankPanicked(Rank),
}
