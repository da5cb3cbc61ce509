//! End-to-end runs of the thread-per-rank driver
//!
//! These tests advect a lattice of particles through a slab-decomposed grid
//! and check that migration between ranks conserves and relocates them:
//! - Every placed particle is held by exactly one rank at the end
//! - Particles actually travel through shadow cells and group-wide resolution
//! - A failing rank surfaces its own error rather than a peer's disconnect

use orchestrator::config::{BoundaryMode, DomainBounds, VelocityField};
use orchestrator::{run_distributed, OrchestratorError, RunConfig};
use swarm::{SwarmConfig, SwarmError};

fn drift_config(ranks: usize, steps: u64) -> RunConfig {
    RunConfig {
        name: "drift".to_string(),
        dim: 2,
        domain: DomainBounds {
            min: [0.0, 0.0, 0.0],
            max: [4.0, 2.0, 0.0],
        },
        cells: [8, 4, 1],
        ranks,
        particles_per_axis: 2,
        steps,
        dt: 0.1,
        velocity: VelocityField::Uniform {
            velocity: [1.0, 0.3, 0.0],
        },
        boundary: BoundaryMode::Periodic,
        swarm: SwarmConfig::default(),
    }
}

#[test]
fn test_two_rank_drift_conserves_particles() {
    let config = drift_config(2, 20);
    let result = run_distributed(&config).unwrap();

    assert_eq!(result.ranks.len(), 2);
    assert_eq!(result.total_particles(), config.initial_particle_count());
    assert_eq!(result.steps, 20);
    assert!((result.sim_time - 2.0).abs() < 1e-12);

    for summary in &result.ranks {
        assert_eq!(summary.passes, 20);
        assert_eq!(summary.initial_count, config.initial_particle_count() / 2);
    }

    let shadow_sent: usize = result.ranks.iter().map(|r| r.shadow_sent).sum();
    let shadow_received: usize = result.ranks.iter().map(|r| r.shadow_received).sum();
    assert!(shadow_sent > 0, "no particle crossed a shadow cell");
    assert_eq!(shadow_sent, shadow_received);

    // particles wrapping around x have no shadow route back to rank 0
    let global_sent: usize = result.ranks.iter().map(|r| r.global_sent).sum();
    let global_claimed: usize = result.ranks.iter().map(|r| r.global_claimed).sum();
    assert!(global_sent > 0, "no particle wrapped around the domain");
    assert_eq!(global_sent, global_claimed);

    let foreign: usize = result.ranks.iter().map(|r| r.foreign).sum();
    assert!(foreign > 0);

    // only rank 0 learns the group-wide pass time
    assert!(result.ranks[0].max_pass_time.is_some());
    assert!(result.ranks[1].max_pass_time.is_none());
}

#[test]
fn test_drift_over_uneven_slabs() {
    // 8 columns over 3 ranks: 3 + 3 + 2
    let config = drift_config(3, 15);
    let result = run_distributed(&config).unwrap();

    assert_eq!(result.total_particles(), config.initial_particle_count());
    let initial: Vec<usize> = result.ranks.iter().map(|r| r.initial_count).collect();
    assert_eq!(initial, vec![48, 48, 32]);
}

#[test]
fn test_single_rank_run_keeps_everything() {
    let config = drift_config(1, 12);
    let result = run_distributed(&config).unwrap();

    let only = &result.ranks[0];
    assert_eq!(only.final_count, config.initial_particle_count());
    assert_eq!(only.foreign, 0);
    assert_eq!(only.shadow_sent, 0);
    assert_eq!(only.passes, 12);
}

#[test]
fn test_three_dimensional_vortex_with_clamped_walls() {
    let config = RunConfig {
        name: "vortex".to_string(),
        dim: 3,
        domain: DomainBounds {
            min: [0.0, 0.0, 0.0],
            max: [2.0, 2.0, 0.5],
        },
        cells: [8, 8, 2],
        ranks: 4,
        particles_per_axis: 1,
        steps: 30,
        dt: 0.02,
        velocity: VelocityField::Rotation {
            centre: [1.0, 1.0, 0.0],
            angular_velocity: 4.0,
        },
        boundary: BoundaryMode::Clamp,
        swarm: SwarmConfig::default(),
    };
    let result = run_distributed(&config).unwrap();

    assert_eq!(result.total_particles(), config.initial_particle_count());
    let shadow_sent: usize = result.ranks.iter().map(|r| r.shadow_sent).sum();
    assert!(shadow_sent > 0);
}

#[test]
fn test_tight_growth_settings_still_conserve() {
    let mut config = drift_config(2, 25);
    config.swarm = SwarmConfig {
        cell_particle_tbl_delta: 1,
        extra_particles_factor: 0.001,
        minimum_particles_delta: 1,
        validate_coords: true,
        defensive: false,
    };
    let result = run_distributed(&config).unwrap();
    assert_eq!(result.total_particles(), config.initial_particle_count());
}

#[test]
fn test_non_finite_velocity_surfaces_rank_error() {
    let mut config = drift_config(2, 5);
    config.velocity = VelocityField::Uniform {
        velocity: [f64::NAN, 0.0, 0.0],
    };
    let err = run_distributed(&config).unwrap_err();
    assert!(
        matches!(
            err,
            OrchestratorError::Rank {
                source: SwarmError::NonFiniteCoordinate { .. },
                ..
            }
        ),
        "unexpected error: {err}"
    );
}

#[test]
fn test_invalid_config_rejected_before_spawning() {
    let config = drift_config(0, 5);
    assert!(matches!(
        run_distributed(&config),
        Err(OrchestratorError::InvalidConfig(_))
    ));
}
