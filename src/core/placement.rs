// src/core/placement.rs

//! Deterministic replica placement: assigns partition replicas onto
//! brokers, optionally rack-aware, guaranteeing balance and fault-domain
//! spread. A pure function over an input broker list — no I/O, no shared
//! state, safe to call from any thread.

use crate::core::errors::BrokerError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::metadata::{Assignment, BrokerMetadata};

/// How the caller wants mixed rack-tag input handled. See `spec.md` §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RackAwareMode {
    /// Mixed rack info (some brokers tagged, some not) is a configuration error.
    Enforced,
    /// Mixed rack info silently downgrades to rack-unaware placement.
    Safe,
    /// Rack tags are ignored entirely; always rack-unaware.
    #[default]
    Disabled,
}

/// Explicit, injectable randomness source for `start_index`/`shift`, so
/// placement stays a pure, deterministic function under test while still
/// picking real randomness by default in production.
pub trait StartIndexSource {
    fn next_index(&mut self, bound: usize) -> usize;
}

/// The default source: a thread-local RNG, used whenever the caller does
/// not pin `fixed_start`/`start_partition`.
pub struct ThreadRngSource;

impl StartIndexSource for ThreadRngSource {
    fn next_index(&mut self, bound: usize) -> usize {
        rand::thread_rng().gen_range(0..bound)
    }
}

/// Safety cap on rack-aware constraint-skipping loops (see `spec.md` §9
/// Open Question: the source loops until `done` without a bound; we assert
/// termination within `O(num_brokers)` iterations per replica).
const MAX_SKIP_ITERATIONS_FACTOR: usize = 4;

/// Computes `partition_id -> ordered replica list` for `n_partitions` new
/// partitions with replication factor `rf`, over the given broker list.
///
/// `fixed_start` / `start_partition` pin the starting broker index and the
/// first partition id emitted; pass `-1` for either to let placement pick
/// a random starting point (via `rng`). Passing explicit values makes the
/// output bitwise reproducible — this is also how [`add_partitions`]
/// extends an existing topic deterministically.
pub fn assign(
    brokers: &[BrokerMetadata],
    n_partitions: i64,
    rf: i64,
    fixed_start: i64,
    start_partition: i64,
    mode: RackAwareMode,
    rng: &mut dyn StartIndexSource,
) -> Result<Assignment, BrokerError> {
    if n_partitions <= 0 {
        return Err(BrokerError::Configuration(
            "n_partitions must be positive".into(),
        ));
    }
    if rf <= 0 {
        return Err(BrokerError::Configuration(
            "replication factor must be positive".into(),
        ));
    }
    if rf as usize > brokers.len() {
        return Err(BrokerError::Configuration(format!(
            "replication factor {rf} exceeds broker count {}",
            brokers.len()
        )));
    }

    let rack_aware = resolve_rack_awareness(brokers, mode)?;

    if rack_aware {
        assign_rack_aware(brokers, n_partitions, rf, fixed_start, start_partition, rng)
    } else {
        Ok(assign_rack_unaware(
            brokers,
            n_partitions,
            rf,
            fixed_start,
            start_partition,
            rng,
        ))
    }
}

/// Extends an existing topic by `n_partitions` new partitions, continuing
/// the rotation from where the original assignment left off.
///
/// `existing` must already contain a contiguous `[0, existing_count)` key
/// range with a uniform replication factor; the new partitions are keyed
/// `[existing_count, existing_count + n_partitions)`.
pub fn add_partitions(
    brokers: &[BrokerMetadata],
    existing: &Assignment,
    n_partitions: i64,
    mode: RackAwareMode,
    rng: &mut dyn StartIndexSource,
) -> Result<Assignment, BrokerError> {
    let rf = super::metadata::replication_factor(existing).ok_or_else(|| {
        BrokerError::Configuration("cannot add partitions to an empty assignment".into())
    })? as i64;

    let existing_count = existing.len() as i64;
    let partition_zero = existing.get(&0).ok_or_else(|| {
        BrokerError::Configuration("existing assignment must contain partition 0".into())
    })?;
    let first_broker_of_zero = partition_zero[0];
    let fixed_start_index = brokers
        .iter()
        .position(|b| b.id == first_broker_of_zero)
        .ok_or_else(|| {
            BrokerError::Configuration(
                "partition 0's preferred replica is not in the candidate broker list".into(),
            )
        })? as i64;

    let delta = assign(
        brokers,
        n_partitions,
        rf,
        fixed_start_index,
        existing_count,
        mode,
        rng,
    )?;

    let mut result = existing.clone();
    result.extend(delta);
    Ok(result)
}

fn resolve_rack_awareness(
    brokers: &[BrokerMetadata],
    mode: RackAwareMode,
) -> Result<bool, BrokerError> {
    if mode == RackAwareMode::Disabled {
        return Ok(false);
    }
    let with_rack = brokers.iter().filter(|b| b.rack.is_some()).count();
    if with_rack == 0 {
        Ok(false)
    } else if with_rack == brokers.len() {
        Ok(true)
    } else if mode == RackAwareMode::Safe {
        Ok(false)
    } else {
        Err(BrokerError::Configuration(
            "rack-aware placement requested with partial rack information".into(),
        ))
    }
}

fn assign_rack_unaware(
    brokers: &[BrokerMetadata],
    n_partitions: i64,
    rf: i64,
    fixed_start: i64,
    start_partition: i64,
    rng: &mut dyn StartIndexSource,
) -> Assignment {
    let ids: Vec<i32> = brokers.iter().map(|b| b.id).collect();
    let n = ids.len();

    let start_index = if fixed_start >= 0 {
        fixed_start as usize
    } else {
        rng.next_index(n)
    };
    let mut shift = if fixed_start >= 0 {
        // `fixed_start` pins the shift too, matching the teacher-algorithm's
        // reuse of the same `fixed_start` parameter for both roles.
        fixed_start as usize
    } else {
        rng.next_index(n)
    };

    let mut result = Assignment::new();
    let first_partition = start_partition.max(0);
    for offset in 0..n_partitions {
        let p = first_partition + offset;
        if p > 0 && (p as usize) % n == 0 {
            shift += 1;
        }
        let first = (p as usize + start_index) % n;
        let mut replicas = Vec::with_capacity(rf as usize);
        replicas.push(ids[first]);
        for j in 0..(rf as usize - 1) {
            let idx = wrapping_back(first, shift + j, n);
            replicas.push(ids[idx]);
        }
        result.insert(p as i32, replicas);
    }
    result
}

/// `(first - 1 - step mod (n-1)) mod n`, computed in `i64` to stay correct
/// under the negative intermediate values the rotation produces.
///
/// Rack-unaware placement walks the follower rotation backwards from
/// `first`; this is the form that reproduces the worked matrix in
/// `spec.md` §8 scenario 1 (the forward form quoted in §4.A's prose
/// produces a different, non-matching rotation for this mode — the rack-
/// unaware and rack-aware follower rotations are not mirror images of one
/// another in the source algorithm).
fn wrapping_back(first: usize, step: usize, n: usize) -> usize {
    let n_i = n as i64;
    let denom = (n_i - 1).max(1);
    let raw = first as i64 - 1 - (step as i64 % denom);
    raw.rem_euclid(n_i) as usize
}

fn assign_rack_aware(
    brokers: &[BrokerMetadata],
    n_partitions: i64,
    rf: i64,
    fixed_start: i64,
    start_partition: i64,
    rng: &mut dyn StartIndexSource,
) -> Result<Assignment, BrokerError> {
    let mut by_rack: BTreeMap<String, Vec<i32>> = BTreeMap::new();
    for b in brokers {
        by_rack
            .entry(b.rack.clone().expect("checked by resolve_rack_awareness"))
            .or_default()
            .push(b.id);
    }
    for ids in by_rack.values_mut() {
        ids.sort_unstable();
    }
    let racks: Vec<&String> = by_rack.keys().collect();
    let num_racks = racks.len();

    // Interleave: round-robin across racks in sorted rack order.
    let mut cursors = vec![0usize; num_racks];
    let mut interleaved = Vec::with_capacity(brokers.len());
    loop {
        let mut placed_any = false;
        for (ri, rack) in racks.iter().enumerate() {
            let list = &by_rack[*rack];
            if cursors[ri] < list.len() {
                interleaved.push(list[cursors[ri]]);
                cursors[ri] += 1;
                placed_any = true;
            }
        }
        if !placed_any {
            break;
        }
    }
    let l = interleaved;
    let n = l.len();

    // Map broker id -> rack for the placement constraints below.
    let mut rack_of: BTreeMap<i32, &String> = BTreeMap::new();
    for (rack, ids) in &by_rack {
        for id in ids {
            rack_of.insert(*id, rack);
        }
    }

    let start_index = if fixed_start >= 0 {
        fixed_start as usize
    } else {
        rng.next_index(n)
    };
    let mut shift = if fixed_start >= 0 {
        fixed_start as usize
    } else {
        rng.next_index(n)
    };

    let mut result = Assignment::new();
    let first_partition = start_partition.max(0);
    for offset in 0..n_partitions {
        let p = first_partition + offset;
        if p > 0 && (p as usize) % n == 0 {
            shift += 1;
        }
        let first = (p as usize + start_index) % n;
        let mut replicas: Vec<i32> = vec![l[first]];
        let mut used_brokers: HashSet<i32> = HashSet::from([l[first]]);
        let mut used_racks: HashSet<&String> = HashSet::from([rack_of[&l[first]]]);

        for j in 0..(rf as usize - 1) {
            let scaled_shift = shift * num_racks + j;
            let mut candidate_idx = (first + 1 + scaled_shift % n) % n;
            let mut iterations = 0usize;
            let cap = n.max(1) * MAX_SKIP_ITERATIONS_FACTOR;
            loop {
                let candidate = l[candidate_idx];
                let candidate_rack = rack_of[&candidate];
                let fresh_rack_available = used_racks.len() < num_racks;
                let violates_rack = fresh_rack_available && used_racks.contains(candidate_rack);
                let fresh_broker_available = used_brokers.len() < brokers.len();
                let violates_broker = fresh_broker_available && used_brokers.contains(&candidate);

                if !violates_rack && !violates_broker {
                    replicas.push(candidate);
                    used_brokers.insert(candidate);
                    used_racks.insert(candidate_rack);
                    break;
                }

                iterations += 1;
                if iterations > cap {
                    // Defensive cap per spec.md §9 Open Question: with
                    // num_brokers % num_racks != 0 the fresh-broker
                    // predicate can only be satisfied after revisiting
                    // racks; fall back to the first non-repeated broker.
                    let fallback = l
                        .iter()
                        .find(|id| !used_brokers.contains(*id))
                        .copied()
                        .unwrap_or(candidate);
                    replicas.push(fallback);
                    used_brokers.insert(fallback);
                    used_racks.insert(rack_of[&fallback]);
                    break;
                }
                candidate_idx = (candidate_idx + 1) % n;
            }
        }
        result.insert(p as i32, replicas);
    }
    Ok(result)
}
