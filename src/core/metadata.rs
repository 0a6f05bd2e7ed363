// src/core/metadata.rs

//! Shared data model used by replica placement, leader selection, and the
//! network client: broker identity, partition assignments, and the
//! controller's read-only view of cluster liveness.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Identity and rack tag of one broker in the cluster.
///
/// Two brokers with the same `id` are indistinguishable; `id` is the only
/// field placement and election logic key off of.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrokerMetadata {
    pub id: i32,
    pub rack: Option<String>,
}

impl BrokerMetadata {
    pub fn new(id: i32) -> Self {
        Self { id, rack: None }
    }

    pub fn with_rack(id: i32, rack: impl Into<String>) -> Self {
        Self {
            id,
            rack: Some(rack.into()),
        }
    }
}

/// `partition_id -> ordered replica list`, produced by [`crate::core::placement::assign`].
///
/// The first entry of each partition's list is the *preferred* replica
/// (the default leader). All partitions in one `Assignment` share the same
/// replication factor.
pub type Assignment = BTreeMap<i32, Vec<i32>>;

/// Returns the replication factor of an assignment, or `None` if it is empty.
/// Assumes (per the `assign` invariant) that every partition has the same length.
pub fn replication_factor(assignment: &Assignment) -> Option<usize> {
    assignment.values().next().map(|v| v.len())
}

/// Leadership and in-sync-replica bookkeeping for one partition.
///
/// Invariants: `leader` is an element of `isr`; `isr` is a subset of the
/// partition's assigned replicas. `leader_epoch` and `zk_version` only
/// increase across successful transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderAndIsr {
    pub leader: i32,
    pub leader_epoch: i64,
    pub isr: IndexSet<i32>,
    pub zk_version: i64,
}

impl LeaderAndIsr {
    pub fn new(leader: i32, isr: impl IntoIterator<Item = i32>) -> Self {
        Self {
            leader,
            leader_epoch: 0,
            isr: isr.into_iter().collect(),
            zk_version: 0,
        }
    }

    /// Produces the successor state for a successful transition: same
    /// leader/isr shape the caller supplies, epoch and version bumped by one.
    fn bumped(&self, leader: i32, isr: IndexSet<i32>) -> Self {
        Self {
            leader,
            leader_epoch: self.leader_epoch + 1,
            isr,
            zk_version: self.zk_version + 1,
        }
    }
}

/// A unique identifier for a partition within the controller's view:
/// `(topic, partition_id)`.
pub type PartitionKey = (String, i32);

/// The controller's read-only view of the cluster, as consulted by the
/// leader selector. Selectors never mutate this; they take a snapshot and
/// return a brand-new [`LeaderAndIsr`] for the caller to commit.
#[derive(Debug, Clone, Default)]
pub struct ClusterState {
    pub live_brokers: HashSet<i32>,
    pub shutting_down: HashSet<i32>,
    pub partition_assignment: HashMap<PartitionKey, Vec<i32>>,
    pub leader_info: HashMap<PartitionKey, LeaderAndIsr>,
    /// Per-topic override of whether an unclean (out-of-ISR) election may
    /// elect a leader that has lost committed data.
    pub unclean_election_enabled: HashMap<String, bool>,
}

impl ClusterState {
    pub fn unclean_election_enabled_for(&self, topic: &str) -> bool {
        self.unclean_election_enabled
            .get(topic)
            .copied()
            .unwrap_or(false)
    }

    pub fn assigned_replicas(&self, key: &PartitionKey) -> Option<&Vec<i32>> {
        self.partition_assignment.get(key)
    }
}

/// Internal helper used by `election.rs`: apply a transition and bump
/// epoch/version, kept here so the bump arithmetic has one definition.
pub(crate) fn transition(current: &LeaderAndIsr, leader: i32, isr: IndexSet<i32>) -> LeaderAndIsr {
    current.bumped(leader, isr)
}
