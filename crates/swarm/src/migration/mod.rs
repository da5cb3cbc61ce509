//! Inter-rank particle migration
//!
//! One pass runs six phases in a fixed order, with no re-entry:
//!
//! 1. Scan -- pack shadow-cell particles per neighbour and copy out
//!    outside-domain particles; their slots join the free pool.
//! 2. CountExchange -- blocking per-shadow-cell counts with every neighbour.
//! 3. DataExchange -- non-blocking record sends and sized receives, joined
//!    at a single wait point.
//! 4. Integrate -- received particles take free slots (lowest first) or are
//!    appended, and are filed under the local cell they classify into.
//! 5. GlobalResolve -- outside-domain particles are gathered group-wide and
//!    claimed by exactly one rank.
//! 6. Compact -- unused free slots are closed from the tail and the store is
//!    reallocated once.
//!
//! Sends always operate on copies taken during Scan, so a slot can be handed
//! to an arriving particle as soon as its own record has been packed.

mod global;
mod shadow;
mod slots;

use std::time::{Duration, Instant};

use crate::error::{Result, SwarmError};
use crate::swarm::Swarm;
use crate::transport::{all_gather_u64, decode, encode, Transport};

use self::slots::SlotPool;

/// Summary of one migration pass on one rank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    /// Pass number, starting at 1
    pub pass: u64,
    /// Number of neighbouring ranks
    pub neighbors: usize,
    /// Particles sent to neighbours through shadow cells
    pub shadow_sent: usize,
    /// Particles received from neighbours through shadow cells
    pub shadow_received: usize,
    /// Particles this rank sent for group-wide resolution
    pub global_sent: usize,
    /// Particles this rank claimed during group-wide resolution
    pub global_claimed: usize,
    /// Particles needing group-wide resolution across all ranks
    pub global_total: u64,
    /// Vacated slots reused by arriving particles
    pub slots_reused: usize,
    /// Records moved to close the remaining holes
    pub holes_compacted: usize,
    /// Live particles after the pass
    pub final_count: usize,
    /// Particle count across all ranks after the pass, when checked
    pub global_count: Option<u64>,
    /// Time spent in the pass on this rank
    pub elapsed: Duration,
    /// Longest pass time across the group, on rank 0 only
    pub max_elapsed: Option<Duration>,
}

/// Per-swarm migration driver. Holds statistics between passes.
#[derive(Debug, Default)]
pub struct MigrationHandler {
    passes: u64,
    last_report: Option<MigrationReport>,
}

impl MigrationHandler {
    /// Number of completed passes.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Report of the most recent completed pass.
    pub fn last_report(&self) -> Option<&MigrationReport> {
        self.last_report.as_ref()
    }

    /// Run one complete pass over `swarm`.
    pub(crate) fn run(
        &mut self,
        swarm: &mut Swarm,
        transport: &dyn Transport,
    ) -> Result<MigrationReport> {
        let start = Instant::now();
        let rank = transport.rank();
        let defensive = swarm.config.defensive;
        let info = swarm.layout.shadow_info().cloned().unwrap_or_default();
        shadow::check_topology(&info, swarm, rank)?;

        let before = if defensive {
            Some(all_gather_u64(transport, swarm.len() as u64)?.iter().sum::<u64>())
        } else {
            None
        };

        let mut report = MigrationReport {
            pass: self.passes + 1,
            neighbors: info.neighbors.len(),
            ..Default::default()
        };

        // Scan. Outside-domain particles first: packing a shadow particle
        // resets its owning cell to the sentinel.
        let (outside, outside_vacated) = global::scan(swarm)?;
        let (outgoing, shadow_vacated) = shadow::scan(swarm, &info)?;
        report.shadow_sent = shadow_vacated.len();
        let mut pool = SlotPool::new(shadow_vacated, outside_vacated)?;
        tracing::debug!(
            "rank {}: scan found {} shadow and {} outside-domain particles",
            rank,
            report.shadow_sent,
            outside.count
        );

        // CountExchange
        let incoming_counts = shadow::exchange_counts(&info, &outgoing, transport)?;

        // DataExchange
        let record_size = swarm.store.record_size();
        let incoming =
            shadow::exchange_records(&info, outgoing, incoming_counts, record_size, transport)?;

        // Integrate
        let (received, reused) = shadow::integrate(swarm, &info, &incoming, &mut pool, rank)?;
        report.shadow_received = received;
        report.slots_reused = reused;
        tracing::debug!(
            "rank {}: integrated {} particles from neighbours, {} free slots left",
            rank,
            received,
            pool.len()
        );

        // GlobalResolve
        let resolution = global::resolve(swarm, outside, &mut pool, transport)?;
        report.global_sent = resolution.sent;
        report.global_claimed = resolution.claimed;
        report.global_total = resolution.global_total;
        report.slots_reused += resolution.reused;

        // Compact
        report.holes_compacted = slots::compact(swarm, pool.into_holes())?;
        swarm.store.realloc();
        report.final_count = swarm.len();

        if let Some(before) = before {
            let after: u64 = all_gather_u64(transport, swarm.len() as u64)?.iter().sum();
            if after != before {
                tracing::error!(
                    "rank {}: global particle count went from {} to {}",
                    rank,
                    before,
                    after
                );
                return Err(SwarmError::ConservationViolated { before, after });
            }
            report.global_count = Some(after);
        }

        report.elapsed = start.elapsed();
        let times = transport.all_gather(&encode(&[report.elapsed.as_secs_f64()]))?;
        if rank == 0 {
            let mut max = 0.0_f64;
            for payload in &times {
                for t in decode::<f64>(rank, payload)? {
                    max = max.max(t);
                }
            }
            report.max_elapsed = Some(Duration::from_secs_f64(max));
            tracing::info!(
                "swarm '{}' migration pass {}: max time across {} ranks {:.3} ms",
                swarm.name(),
                report.pass,
                transport.size(),
                max * 1e3
            );
        }

        tracing::info!(
            "rank {} swarm '{}' pass {}: {} neighbours, shadow sent {} received {}, \
             global sent {} claimed {} of {}, {} slots reused, {} holes compacted, {} particles",
            rank,
            swarm.name(),
            report.pass,
            report.neighbors,
            report.shadow_sent,
            report.shadow_received,
            report.global_sent,
            report.global_claimed,
            report.global_total,
            report.slots_reused,
            report.holes_compacted,
            report.final_count
        );

        self.passes += 1;
        self.last_report = Some(report.clone());
        Ok(report)
    }
}
