// src/core/client/metadata_client.rs

//! Cluster-metadata snapshot and the updater that keeps it fresh,
//! `spec.md` §3/§4.C. Two collaborating objects with a small mutual
//! interface, injectable for testing, per Design Notes §9.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::node::{Initiator, Node};

/// One partition's metadata as known from the last successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionMetadata {
    pub leader: Option<i32>,
    pub replicas: Vec<i32>,
    pub isr: Vec<i32>,
}

/// An immutable snapshot of cluster metadata. Replaced atomically on
/// successful refresh; never mutated in place (`spec.md` §3).
#[derive(Debug, Clone, Default)]
pub struct ClusterMetadata {
    pub nodes: Vec<Node>,
    pub topics: HashMap<String, HashMap<i32, PartitionMetadata>>,
}

impl ClusterMetadata {
    pub fn bootstrap(nodes: Vec<Node>) -> Self {
        Self {
            nodes,
            topics: HashMap::new(),
        }
    }
}

/// The raw payload of a metadata response, as handed to
/// [`MetadataUpdater::handle_completed_receive`]. The wire decoding itself
/// is an external collaborator (`spec.md` §6); this is the already-parsed
/// shape the updater consumes.
#[derive(Debug, Clone, Default)]
pub struct MetadataResponsePayload {
    pub nodes: Vec<Node>,
    pub topics: HashMap<String, HashMap<i32, PartitionMetadata>>,
}

/// Owns the mutable cluster-metadata entity and decides when a refresh is
/// due. Collaborates with [`super::network_client::NetworkClient`] through
/// exactly the methods `spec.md` §4.C names.
pub struct MetadataUpdater {
    metadata: ClusterMetadata,
    need_update: bool,
    in_flight: bool,
    last_refresh: Option<Instant>,
    last_successful_refresh: Option<Instant>,
    last_no_node: Option<Instant>,
    metadata_max_age: Duration,
    refresh_backoff: Duration,
}

impl MetadataUpdater {
    pub fn new(bootstrap_nodes: Vec<Node>, metadata_max_age: Duration, refresh_backoff: Duration) -> Self {
        Self {
            metadata: ClusterMetadata::bootstrap(bootstrap_nodes),
            need_update: true,
            in_flight: false,
            last_refresh: None,
            last_successful_refresh: None,
            last_no_node: None,
            metadata_max_age,
            refresh_backoff,
        }
    }

    /// Snapshot of currently known nodes (bootstrap or last refresh).
    pub fn fetch_nodes(&self) -> &[Node] {
        &self.metadata.nodes
    }

    pub fn metadata(&self) -> &ClusterMetadata {
        &self.metadata
    }

    /// True iff a refresh is not already outstanding and the next-update
    /// deadline has been reached.
    pub fn is_update_due(&self, now: Instant) -> bool {
        if self.in_flight {
            return false;
        }
        self.need_update
            || self
                .last_refresh
                .is_none_or(|t| now.saturating_duration_since(t) >= self.metadata_max_age)
    }

    pub fn request_update(&mut self) {
        self.need_update = true;
    }

    /// Computes milliseconds until the next allowed update, taking whatever
    /// action is due (enqueueing an internal request, or recording that no
    /// node was available). Returns the clip value `poll` should use for
    /// its own timeout.
    ///
    /// `least_loaded` / `is_sendable` / `is_connectable` / `enqueue_internal`
    /// / `initiate_connect` are supplied as closures so this stays a pure
    /// decision function over the updater's own state, with all side
    /// effects on the network client funneled through one seam.
    #[allow(clippy::too_many_arguments)]
    pub fn maybe_update(
        &mut self,
        now: Instant,
        least_loaded: impl FnOnce() -> Option<Node>,
        is_sendable: impl FnOnce(i32) -> bool,
        is_connectable: impl FnOnce(i32) -> bool,
        mut enqueue_internal: impl FnMut(i32),
        mut initiate_connect: impl FnMut(&Node),
    ) -> i64 {
        let t_due = if self.in_flight {
            i64::MAX
        } else {
            let deadline_in = self
                .last_refresh
                .map(|t| {
                    self.metadata_max_age
                        .saturating_sub(now.saturating_duration_since(t))
                        .as_millis() as i64
                })
                .unwrap_or(0);
            if self.need_update { 0 } else { deadline_in }
        };
        let t_backoff = self
            .last_no_node
            .map(|t| {
                self.refresh_backoff
                    .saturating_sub(now.saturating_duration_since(t))
                    .as_millis() as i64
            })
            .unwrap_or(0);
        let t_in_flight = if self.in_flight { i64::MAX } else { 0 };

        let delay = t_due.max(t_backoff).max(t_in_flight);
        if delay > 0 {
            return delay;
        }

        match least_loaded() {
            None => {
                self.last_no_node = Some(now);
                debug!("metadata refresh: no node available, backing off");
                self.refresh_backoff.as_millis() as i64
            }
            Some(node) => {
                if is_sendable(node.id) {
                    self.in_flight = true;
                    self.need_update = false;
                    self.last_refresh = Some(now);
                    enqueue_internal(node.id);
                    0
                } else if is_connectable(node.id) {
                    initiate_connect(&node);
                    0
                } else {
                    self.last_no_node = Some(now);
                    self.refresh_backoff.as_millis() as i64
                }
            }
        }
    }

    /// If `initiator` is internal, clears the in-flight flag and reports
    /// that the disconnection was swallowed (not surfaced to the caller).
    pub fn maybe_handle_disconnection(&mut self, initiator: Initiator) -> bool {
        if initiator == Initiator::Internal {
            self.in_flight = false;
            self.request_update();
            true
        } else {
            false
        }
    }

    /// If `initiator` is internal, consumes the response body and either
    /// replaces the metadata snapshot (on success) or marks a failed
    /// update (if the response carried zero usable nodes), and reports
    /// that the receive was swallowed.
    pub fn maybe_handle_completed_receive(
        &mut self,
        initiator: Initiator,
        now: Instant,
        body: Option<MetadataResponsePayload>,
    ) -> bool {
        if initiator != Initiator::Internal {
            return false;
        }
        self.in_flight = false;

        match body {
            Some(payload) if !payload.nodes.is_empty() => {
                self.metadata = ClusterMetadata {
                    nodes: payload.nodes,
                    topics: payload.topics,
                };
                self.last_successful_refresh = Some(now);
                info!("cluster metadata refreshed");
            }
            _ => {
                warn!("metadata refresh failed: response carried zero usable nodes");
                self.need_update = true;
                self.last_no_node = Some(now);
            }
        }
        true
    }

    pub fn last_successful_refresh(&self) -> Option<Instant> {
        self.last_successful_refresh
    }
}
