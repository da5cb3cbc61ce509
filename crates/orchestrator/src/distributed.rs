//! Distributed execution coordinator
//!
//! Each rank runs in its own thread with its own `Swarm` over a slab of the
//! global grid. Ranks talk only through the in-process transport, so the
//! per-rank body is the same code a multi-process launcher would run.
//!
//! One step is: advect every local particle through the velocity field,
//! then recompute ownership and migrate.

use std::thread;
use std::time::Duration;

use swarm::{LocalGroup, Rank, Swarm, SwarmError, Transport};

use crate::config::{BoundaryMode, RunConfig};
use crate::decomposition::SlabLayout;
use crate::error::OrchestratorError;
use crate::placement::{place_lattice, run_schema, ORIGIN_RANK_FIELD};

/// What one rank saw over a run
#[derive(Debug, Clone, Default)]
pub struct RankSummary {
    /// Rank
    pub rank: Rank,
    /// Particles placed at start
    pub initial_count: usize,
    /// Particles held at the end
    pub final_count: usize,
    /// Completed migration passes
    pub passes: u64,
    /// Particles held at the end that were placed on another rank
    pub foreign: usize,
    /// Particles sent through shadow cells, summed over passes
    pub shadow_sent: usize,
    /// Particles received through shadow cells, summed over passes
    pub shadow_received: usize,
    /// Particles sent for group-wide resolution, summed over passes
    pub global_sent: usize,
    /// Particles claimed during group-wide resolution, summed over passes
    pub global_claimed: usize,
    /// Longest single pass across the group (rank 0 only)
    pub max_pass_time: Option<Duration>,
}

/// Result of a distributed run
#[derive(Debug, Clone)]
pub struct DistributedResult {
    /// Per-rank summaries, indexed by rank
    pub ranks: Vec<RankSummary>,
    /// Number of steps executed
    pub steps: u64,
    /// Total simulated time (seconds)
    pub sim_time: f64,
}

impl DistributedResult {
    /// Particles held across all ranks at the end.
    pub fn total_particles(&self) -> usize {
        self.ranks.iter().map(|r| r.final_count).sum()
    }
}

/// Run `config.steps` advect-and-migrate steps on `config.ranks` threads.
pub fn run_distributed(config: &RunConfig) -> Result<DistributedResult, OrchestratorError> {
    config.validate()?;
    tracing::info!(
        "Distributed run '{}': {} ranks, {:?} cells, {} steps",
        config.name,
        config.ranks,
        config.grid(),
        config.steps
    );

    let handles: Vec<_> = LocalGroup::new(config.ranks)
        .into_transports()
        .into_iter()
        .map(|transport| {
            let config = config.clone();
            thread::spawn(move || run_rank(&config, &transport))
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for (rank, handle) in handles.into_iter().enumerate() {
        outcomes.push(
            handle
                .join()
                .unwrap_or_else(|_| Err(OrchestratorError::RankPanicked(rank))),
        );
    }

    let mut ranks = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(summary) => ranks.push(summary),
            Err(e) => failures.push(e),
        }
    }
    if !failures.is_empty() {
        // peers of a failed rank report a disconnect; surface the cause
        let position = failures
            .iter()
            .position(|e| {
                !matches!(
                    e,
                    OrchestratorError::Rank {
                        source: SwarmError::Transport { .. },
                        ..
                    }
                )
            })
            .unwrap_or(0);
        let cause = failures.swap_remove(position);
        tracing::error!("Distributed run '{}' failed: {}", config.name, cause);
        return Err(cause);
    }

    let result = DistributedResult {
        ranks,
        steps: config.steps,
        sim_time: config.steps as f64 * config.dt,
    };
    tracing::info!(
        "Distributed run complete: {} steps, {:.6}s simulated, {} particles",
        result.steps,
        result.sim_time,
        result.total_particles()
    );
    Ok(result)
}

/// Body of one rank: build, place, then step.
pub fn run_rank(
    config: &RunConfig,
    transport: &dyn Transport,
) -> Result<RankSummary, OrchestratorError> {
    let rank = transport.rank();
    let fail = |source: SwarmError| OrchestratorError::Rank { rank, source };

    let layout = SlabLayout::new(rank, config.ranks, config.effective_domain(), config.grid())?;
    let schema = run_schema(config.dim).map_err(fail)?;
    let mut swarm = Swarm::new(
        format!("{}-{}", config.name, rank),
        schema,
        Box::new(layout),
        config.swarm.clone(),
    )
    .map_err(fail)?;

    let mut summary = RankSummary {
        rank,
        initial_count: place_lattice(&mut swarm, config.particles_per_axis, rank as u32)
            .map_err(fail)?,
        ..Default::default()
    };
    swarm.initialise().map_err(fail)?;

    for step in 0..config.steps {
        advect(&mut swarm, config).map_err(fail)?;
        if let Some(report) = swarm.update_all_owners(transport).map_err(fail)? {
            summary.shadow_sent += report.shadow_sent;
            summary.shadow_received += report.shadow_received;
            summary.global_sent += report.global_sent;
            summary.global_claimed += report.global_claimed;
            if let Some(t) = report.max_elapsed {
                summary.max_pass_time = Some(summary.max_pass_time.map_or(t, |m| m.max(t)));
            }
        }
        if (step + 1) % 10 == 0 {
            tracing::debug!(
                "rank {} step {}/{}: {} particles",
                rank,
                step + 1,
                config.steps,
                swarm.len()
            );
        }
    }

    swarm.check_packing_invariant().map_err(fail)?;
    let origin = swarm
        .store()
        .schema()
        .require_field(ORIGIN_RANK_FIELD)
        .map_err(fail)?
        .clone();
    for particle in 0..swarm.len() {
        let placed_on: u32 = swarm.read_field(particle, &origin, 0).map_err(fail)?;
        if placed_on as usize != rank {
            summary.foreign += 1;
        }
    }
    summary.final_count = swarm.len();
    summary.passes = swarm.migration().passes();
    Ok(summary)
}

/// Move every particle by `velocity * dt` and apply the boundary mode.
pub fn advect(swarm: &mut Swarm, config: &RunConfig) -> Result<(), SwarmError> {
    let domain = config.effective_domain();
    for particle in 0..swarm.len() {
        let mut coord = swarm.coord(particle)?;
        let velocity = config.velocity.at(&coord);
        for axis in 0..config.dim {
            let (lo, hi) = (domain.min[axis], domain.max[axis]);
            let mut x = coord[axis] + velocity[axis] * config.dt;
            x = match config.boundary {
                BoundaryMode::Periodic => lo + (x - lo).rem_euclid(hi - lo),
                BoundaryMode::Clamp => x.clamp(lo, hi),
            };
            // the upper face belongs to no cell
            if x >= hi {
                x = hi - (hi - lo) * 1e-9;
            }
            coord[axis] = x;
        }
        swarm.set_coord(particle, &coord[..config.dim])?;
    }
    Ok(())
}
