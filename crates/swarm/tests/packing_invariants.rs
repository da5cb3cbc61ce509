//! Packing invariants under churn, and the two growth policies side by side.

mod common;

use common::strip_swarm;
use swarm::{CellTable, LocalGroup, SwarmConfig};

/// Deterministic pseudo-random sequence (64-bit LCG).
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn unit(&mut self) -> f64 {
        (self.next() % 10_000) as f64 / 10_000.0
    }
}

#[test]
fn invariant_holds_through_insert_move_delete() {
    let transport = LocalGroup::new(1).into_transports().remove(0);
    let width = 8;
    let mut s = strip_swarm(0, 1, width, SwarmConfig::default());
    let mut rng = Lcg(42);

    for _ in 0..400 {
        let x = rng.unit() * width as f64;
        s.insert_particle(&[x, 0.5]).unwrap().unwrap();
    }
    s.initialise().unwrap();
    s.check_packing_invariant().unwrap();

    for round in 0..20 {
        // move a third of the particles within the strip
        for p in 0..s.len() {
            if rng.next() % 3 == 0 {
                let x = rng.unit() * width as f64;
                s.set_coord(p, &[x, 0.5]).unwrap();
            }
        }
        s.update_all_owners(&transport).unwrap();
        s.check_packing_invariant().unwrap();

        // delete a few, insert a few
        for _ in 0..(round % 7) {
            let victim = (rng.next() as usize) % s.len();
            s.delete_particle(victim).unwrap();
        }
        for _ in 0..(round % 5) {
            let x = rng.unit() * width as f64;
            s.insert_particle(&[x, 0.5]).unwrap();
        }
        s.check_packing_invariant().unwrap();

        let listed: usize = (0..width as u32)
            .map(|c| s.cells().count(c).unwrap())
            .sum();
        assert_eq!(listed, s.len());
    }
}

#[test]
fn store_capacity_jumps_at_previous_capacity() {
    let mut s = strip_swarm(0, 1, 4, SwarmConfig::default());
    let mut capacities = vec![s.capacity()];
    for i in 0..2500 {
        let x = (i % 4) as f64 + 0.5;
        s.insert_particle(&[x, 0.5]).unwrap();
        if s.capacity() != *capacities.last().unwrap() {
            capacities.push(s.capacity());
        }
    }
    // floor of 100 until the proportional delta takes over past 2000
    assert_eq!(&capacities[..5], &[0, 101, 201, 301, 401]);
    let last = *capacities.last().unwrap();
    assert!(last >= 2500);
}

#[test]
fn cell_list_shrinks_eagerly_while_store_waits_for_whole_delta() {
    // cell list: size 12, delta 4, count 9 -> 8 shrinks straight to 8
    let mut table = CellTable::new(1, 0, 4).unwrap();
    for p in 0..9 {
        table.add(0, p).unwrap();
    }
    assert_eq!(table.size(0).unwrap(), 12);
    table.remove(0, 3).unwrap();
    assert_eq!(table.size(0).unwrap(), 8);

    // store: removing one particle from a nearly full store does not shrink
    let mut s = strip_swarm(0, 1, 1, SwarmConfig::default());
    for _ in 0..150 {
        s.insert_particle(&[0.5, 0.5]).unwrap();
    }
    let before = s.capacity();
    s.delete_particle(0).unwrap();
    assert_eq!(s.capacity(), before);
    // only dropping a whole delta below capacity releases memory
    while s.len() > before - 100 {
        s.delete_particle(0).unwrap();
    }
    assert_eq!(s.capacity(), s.len());
}
