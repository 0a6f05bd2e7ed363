// src/core/election.rs

//! Partition leader selection: five policies that each take the current
//! (leader, ISR) state plus a cluster snapshot and return a new state and
//! a notify-set, per `spec.md` §4.B. Selectors are pure — they never
//! persist; the caller commits the result and owns the data-loss metric.

use indexmap::IndexSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::errors::BrokerError;
use crate::core::metadata::{transition, ClusterState, LeaderAndIsr, PartitionKey};

/// Counts unclean (out-of-ISR, data-losing) elections across the process,
/// the metric `spec.md` §4.B.1 requires be kept. Shared the way the
/// teacher keeps failover counters as plain atomics on cluster state.
#[derive(Debug, Default)]
pub struct ElectionMetrics {
    pub unclean_elections: AtomicU64,
}

impl ElectionMetrics {
    pub fn record_unclean_election(&self) {
        self.unclean_elections.fetch_add(1, Ordering::Relaxed);
    }
}

/// The outcome of a successful selection: the new leadership state plus
/// the set of brokers that must be notified of the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionResult {
    pub new_state: LeaderAndIsr,
    pub notify_set: IndexSet<i32>,
}

/// A reassignment in progress for a partition: the target replica set the
/// controller wants the partition to end up on.
#[derive(Debug, Clone)]
pub struct Reassignment {
    pub target_replicas: Vec<i32>,
}

/// The five leader-selection policies from `spec.md` §4.B, dispatched by
/// tag with shared context (cluster snapshot, metrics) passed explicitly —
/// this collapses the "inheritance of leader selectors" the source models
/// as a class hierarchy into one function per Design Notes §9.
pub enum LeaderSelector<'a> {
    /// The previous leader died; elect from the live ISR, or (if unclean
    /// elections are allowed for the topic) from any live assigned replica.
    Offline,
    /// An in-flight partition reassignment: the new leader must come from
    /// the reassignment's target replica set.
    Reassigned(&'a Reassignment),
    /// Preferred-replica rebalancing: move leadership back to `AR[0]`.
    PreferredReplica,
    /// A replica is shutting down cleanly; pick a leader that will remain.
    ControlledShutdown,
    /// No leadership change is needed; echo the current state back.
    NoOp,
}

impl<'a> LeaderSelector<'a> {
    /// Runs this policy against `partition`'s current state in `cluster`.
    pub fn select(
        &self,
        partition: &PartitionKey,
        cluster: &ClusterState,
        metrics: &Arc<ElectionMetrics>,
    ) -> Result<SelectionResult, BrokerError> {
        let current = cluster
            .leader_info
            .get(partition)
            .ok_or_else(|| BrokerError::NoReplicaOnline("no leader info for partition".into()))?;
        let ar = cluster
            .assigned_replicas(partition)
            .ok_or_else(|| BrokerError::NoReplicaOnline("no assigned replicas".into()))?;

        match self {
            LeaderSelector::Offline => select_offline(partition, cluster, current, ar, metrics),
            LeaderSelector::Reassigned(r) => select_reassigned(cluster, current, r),
            LeaderSelector::PreferredReplica => select_preferred_replica(cluster, current, ar),
            LeaderSelector::ControlledShutdown => select_controlled_shutdown(cluster, current, ar),
            LeaderSelector::NoOp => select_no_op(current, ar),
        }
    }
}

fn select_offline(
    partition: &PartitionKey,
    cluster: &ClusterState,
    current: &LeaderAndIsr,
    ar: &[i32],
    metrics: &Arc<ElectionMetrics>,
) -> Result<SelectionResult, BrokerError> {
    if ar.is_empty() {
        return Err(BrokerError::NoReplicaOnline(
            "no assigned replicas for partition".into(),
        ));
    }

    let live_ar: IndexSet<i32> = ar
        .iter()
        .copied()
        .filter(|id| cluster.live_brokers.contains(id))
        .collect();
    let live_isr: IndexSet<i32> = current
        .isr
        .iter()
        .copied()
        .filter(|id| cluster.live_brokers.contains(id))
        .collect();

    if !live_isr.is_empty() {
        let new_leader = *ar.iter().find(|id| live_isr.contains(*id)).ok_or_else(|| {
            BrokerError::NoReplicaOnline(
                "no replica online: live ISR member is not an assigned replica".into(),
            )
        })?;
        info!(
            topic = %partition.0, partition = partition.1,
            new_leader, "offline election: electing from live ISR",
        );
        return Ok(SelectionResult {
            new_state: transition(current, new_leader, live_isr),
            notify_set: live_ar,
        });
    }

    if !cluster.unclean_election_enabled_for(&partition.0) {
        return Err(BrokerError::NoReplicaOnline(
            "no replica online: ISR is empty and unclean election is disabled".into(),
        ));
    }

    if live_ar.is_empty() {
        return Err(BrokerError::NoReplicaOnline(
            "no replica online: no assigned replica is live".into(),
        ));
    }

    let new_leader = ar
        .iter()
        .copied()
        .find(|id| live_ar.contains(id))
        .expect("live_ar non-empty by branch, ar order preserved");
    warn!(
        topic = %partition.0, partition = partition.1,
        new_leader, "unclean election: electing outside ISR, data loss is possible",
    );
    metrics.record_unclean_election();
    Ok(SelectionResult {
        new_state: transition(current, new_leader, IndexSet::from([new_leader])),
        notify_set: live_ar,
    })
}

fn select_reassigned(
    cluster: &ClusterState,
    current: &LeaderAndIsr,
    reassignment: &Reassignment,
) -> Result<SelectionResult, BrokerError> {
    if reassignment.target_replicas.is_empty() {
        return Err(BrokerError::NoReplicaOnline(
            "empty reassignment target replica set".into(),
        ));
    }

    let new_leader = reassignment
        .target_replicas
        .iter()
        .copied()
        .find(|id| cluster.live_brokers.contains(id) && current.isr.contains(id));

    match new_leader {
        Some(new_leader) => Ok(SelectionResult {
            new_state: transition(current, new_leader, current.isr.clone()),
            notify_set: reassignment.target_replicas.iter().copied().collect(),
        }),
        None => Err(BrokerError::NoReplicaOnline(
            "none in ISR: no live, in-ISR replica in the reassignment target set".into(),
        )),
    }
}

fn select_preferred_replica(
    cluster: &ClusterState,
    current: &LeaderAndIsr,
    ar: &[i32],
) -> Result<SelectionResult, BrokerError> {
    let preferred = *ar.first().ok_or_else(|| {
        BrokerError::NoReplicaOnline("no assigned replicas for partition".into())
    })?;

    if preferred == current.leader {
        return Err(BrokerError::ElectionNotNeeded);
    }
    if !cluster.live_brokers.contains(&preferred) || !current.isr.contains(&preferred) {
        return Err(BrokerError::StateChangeFailed(
            "preferred replica is not alive or not in ISR".into(),
        ));
    }

    Ok(SelectionResult {
        new_state: transition(current, preferred, current.isr.clone()),
        notify_set: ar.iter().copied().collect(),
    })
}

fn select_controlled_shutdown(
    cluster: &ClusterState,
    current: &LeaderAndIsr,
    ar: &[i32],
) -> Result<SelectionResult, BrokerError> {
    let new_isr: IndexSet<i32> = current
        .isr
        .iter()
        .copied()
        .filter(|id| !cluster.shutting_down.contains(id))
        .collect();
    let live_ar: IndexSet<i32> = ar
        .iter()
        .copied()
        .filter(|id| cluster.live_brokers.contains(id) || cluster.shutting_down.contains(id))
        .collect();

    let new_leader = live_ar.iter().copied().find(|id| new_isr.contains(id));
    match new_leader {
        Some(new_leader) => Ok(SelectionResult {
            new_state: transition(current, new_leader, new_isr),
            notify_set: live_ar,
        }),
        None => Err(BrokerError::StateChangeFailed(
            "no remaining in-ISR replica survives the controlled shutdown".into(),
        )),
    }
}

fn select_no_op(current: &LeaderAndIsr, ar: &[i32]) -> Result<SelectionResult, BrokerError> {
    Ok(SelectionResult {
        new_state: current.clone(),
        notify_set: ar.iter().copied().collect(),
    })
}
