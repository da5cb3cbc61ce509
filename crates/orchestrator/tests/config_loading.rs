//! Loading run configurations from disk

use std::fs;
use std::path::Path;

use orchestrator::config::{BoundaryMode, VelocityField};
use orchestrator::{run_from_config_file, OrchestratorError, RunConfig};
use tempfile::TempDir;

const DRIFT: &str = r#"{
    "name": "file-drift",
    "domain": { "min": [0.0, 0.0, 0.0], "max": [2.0, 1.0, 0.0] },
    "cells": [4, 2, 1],
    "ranks": 2,
    "steps": 8,
    "dt": 0.1,
    "velocity": { "Uniform": { "velocity": [1.0, 0.0, 0.0] } }
}"#;

fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_load_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "drift.json", DRIFT);

    let config = RunConfig::load(&path).unwrap();
    assert_eq!(config.name, "file-drift");
    assert_eq!(config.dim, 2);
    assert_eq!(config.particles_per_axis, 2);
    assert_eq!(config.boundary, BoundaryMode::Periodic);
    assert_eq!(config.swarm.cell_particle_tbl_delta, 4);
    assert!(config.swarm.defensive);
    assert!(matches!(config.velocity, VelocityField::Uniform { .. }));
}

#[test]
fn test_partial_swarm_section() {
    let dir = TempDir::new().unwrap();
    let contents = DRIFT.replace(
        "\"steps\": 8,",
        "\"steps\": 8, \"swarm\": { \"minimum_particles_delta\": 16 },",
    );
    let path = write(&dir, "partial.json", &contents);

    let config = RunConfig::load(&path).unwrap();
    assert_eq!(config.swarm.minimum_particles_delta, 16);
    assert_eq!(config.swarm.extra_particles_factor, 0.05);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let result = RunConfig::load(dir.path().join("absent.json"));
    assert!(matches!(result, Err(OrchestratorError::Io { .. })));
}

#[test]
fn test_malformed_json_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "broken.json", "{ \"name\": ");
    assert!(matches!(
        RunConfig::load(&path),
        Err(OrchestratorError::Parse(_))
    ));
}

#[test]
fn test_invalid_values_rejected_on_load() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "bad-dt.json", &DRIFT.replace("\"dt\": 0.1", "\"dt\": -0.1"));
    assert!(matches!(
        RunConfig::load(&path),
        Err(OrchestratorError::InvalidConfig(_))
    ));

    let path = write(&dir, "bad-dim.json", &DRIFT.replace("\"name\"", "\"dim\": 4, \"name\""));
    assert!(matches!(
        RunConfig::load(&path),
        Err(OrchestratorError::InvalidConfig(_))
    ));
}

#[test]
fn test_run_from_config_file() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "drift.json", DRIFT);

    let result = run_from_config_file(&path).unwrap();
    assert_eq!(result.ranks.len(), 2);
    assert_eq!(result.total_particles(), 4 * 2 * 4);
}

#[test]
fn test_shipped_configs_load() {
    let configs = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs");
    for name in ["two-rank-drift.json", "four-rank-vortex.json"] {
        let config = RunConfig::load(configs.join(name)).unwrap();
        assert!(config.initial_particle_count() > 0, "{name}");
    }
}
