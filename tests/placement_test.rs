// tests/placement_test.rs

//! Deterministic scenario tables for replica placement, `spec.md` §8.

use brokerkit::core::errors::BrokerError;
use brokerkit::core::metadata::BrokerMetadata;
use brokerkit::core::placement::{assign, RackAwareMode, StartIndexSource};

struct FixedSource(usize);

impl StartIndexSource for FixedSource {
    fn next_index(&mut self, _bound: usize) -> usize {
        self.0
    }
}

fn brokers(ids: &[i32]) -> Vec<BrokerMetadata> {
    ids.iter().map(|&id| BrokerMetadata::new(id)).collect()
}

/// `spec.md` §8 scenario 1: 5 no-rack brokers, 10 partitions, rf=3,
/// fixed_start=0, start_partition=0.
#[test]
fn rack_unaware_matches_worked_example() {
    let brokers = brokers(&[0, 1, 2, 3, 4]);
    let mut rng = FixedSource(0);
    let assignment = assign(&brokers, 10, 3, 0, 0, RackAwareMode::Disabled, &mut rng).unwrap();

    let expected_first = [0, 1, 2, 3, 4, 0, 1, 2, 3, 4];
    let expected_second = [4, 0, 1, 2, 3, 3, 4, 0, 1, 2];

    for p in 0..10i32 {
        let replicas = &assignment[&p];
        assert_eq!(replicas.len(), 3, "partition {p} should have 3 replicas");
        assert_eq!(replicas[0], expected_first[p as usize], "partition {p} leader");
        assert_eq!(replicas[1], expected_second[p as usize], "partition {p} second replica");
    }
}

/// `spec.md` §8 scenario 2: 6 brokers across 3 racks, 6 partitions, rf=3.
#[test]
fn rack_aware_matches_worked_example() {
    let brokers = vec![
        BrokerMetadata::with_rack(0, "r1"),
        BrokerMetadata::with_rack(1, "r3"),
        BrokerMetadata::with_rack(2, "r3"),
        BrokerMetadata::with_rack(3, "r2"),
        BrokerMetadata::with_rack(4, "r2"),
        BrokerMetadata::with_rack(5, "r1"),
    ];
    let mut rng = FixedSource(0);
    let assignment = assign(&brokers, 6, 3, 0, 0, RackAwareMode::Enforced, &mut rng).unwrap();

    assert_eq!(assignment[&0], vec![0, 3, 1]);
    assert_eq!(assignment[&1], vec![3, 1, 5]);
    assert_eq!(assignment[&2], vec![1, 5, 4]);
    assert_eq!(assignment[&3], vec![5, 4, 2]);
    assert_eq!(assignment[&4], vec![4, 2, 0]);
    assert_eq!(assignment[&5], vec![2, 0, 3]);
}

#[test]
fn rack_aware_continuation_advances_shift() {
    let brokers = vec![
        BrokerMetadata::with_rack(0, "r1"),
        BrokerMetadata::with_rack(1, "r3"),
        BrokerMetadata::with_rack(2, "r3"),
        BrokerMetadata::with_rack(3, "r2"),
        BrokerMetadata::with_rack(4, "r2"),
        BrokerMetadata::with_rack(5, "r1"),
    ];
    let mut rng = FixedSource(0);
    let assignment = assign(&brokers, 7, 3, 0, 0, RackAwareMode::Enforced, &mut rng).unwrap();
    assert_eq!(assignment[&6], vec![0, 4, 2]);
}

#[test]
fn rack_aware_enforced_rejects_partial_rack_info() {
    let brokers = vec![
        BrokerMetadata::with_rack(0, "r1"),
        BrokerMetadata::new(1),
    ];
    let mut rng = FixedSource(0);
    let err = assign(&brokers, 1, 2, 0, 0, RackAwareMode::Enforced, &mut rng).unwrap_err();
    assert!(matches!(err, BrokerError::Configuration(_)));
}

#[test]
fn rack_aware_safe_downgrades_on_partial_rack_info() {
    let brokers = vec![
        BrokerMetadata::with_rack(0, "r1"),
        BrokerMetadata::new(1),
        BrokerMetadata::new(2),
    ];
    let mut rng = FixedSource(0);
    let assignment = assign(&brokers, 3, 2, 0, 0, RackAwareMode::Safe, &mut rng).unwrap();
    assert_eq!(assignment.len(), 3);
    for replicas in assignment.values() {
        assert_eq!(replicas.len(), 2);
    }
}

#[test]
fn rack_aware_every_replica_set_spans_all_racks_when_rf_equals_rack_count() {
    let brokers = vec![
        BrokerMetadata::with_rack(0, "r1"),
        BrokerMetadata::with_rack(1, "r1"),
        BrokerMetadata::with_rack(2, "r2"),
        BrokerMetadata::with_rack(3, "r2"),
        BrokerMetadata::with_rack(4, "r3"),
        BrokerMetadata::with_rack(5, "r3"),
    ];
    let mut rng = FixedSource(0);
    let assignment = assign(&brokers, 12, 3, -1, -1, RackAwareMode::Enforced, &mut rng).unwrap();

    let rack_of = |id: i32| -> &'static str {
        match id {
            0 | 1 => "r1",
            2 | 3 => "r2",
            _ => "r3",
        }
    };
    for replicas in assignment.values() {
        let racks: std::collections::HashSet<&str> = replicas.iter().copied().map(rack_of).collect();
        assert_eq!(racks.len(), 3, "every replica set must span all 3 racks");
    }
}

#[test]
fn rejects_non_positive_partitions() {
    let brokers = brokers(&[0, 1]);
    let mut rng = FixedSource(0);
    let err = assign(&brokers, 0, 1, 0, 0, RackAwareMode::Disabled, &mut rng).unwrap_err();
    assert!(matches!(err, BrokerError::Configuration(_)));
}

#[test]
fn rejects_rf_exceeding_broker_count() {
    let brokers = brokers(&[0, 1]);
    let mut rng = FixedSource(0);
    let err = assign(&brokers, 1, 3, 0, 0, RackAwareMode::Disabled, &mut rng).unwrap_err();
    assert!(matches!(err, BrokerError::Configuration(_)));
}

#[test]
fn add_partitions_continues_existing_rotation() {
    let brokers = brokers(&[0, 1, 2, 3, 4]);
    let mut rng = FixedSource(0);
    let base = assign(&brokers, 5, 3, 0, 0, RackAwareMode::Disabled, &mut rng).unwrap();

    let mut rng = FixedSource(0);
    let extended =
        brokerkit::core::placement::add_partitions(&brokers, &base, 5, RackAwareMode::Disabled, &mut rng)
            .unwrap();

    assert_eq!(extended.len(), 10);
    for (p, replicas) in &base {
        assert_eq!(&extended[p], replicas);
    }
}
