// src/core/client/network_client.rs

//! The single-threaded, multiplexed request/response engine: per-
//! connection state machines, bounded in-flight pipelines, timeout
//! handling, least-loaded node selection, and metadata-refresh priority.
//! `spec.md` §4.C, §5.
//!
//! Exactly one driver thread may call `poll`/`send`/`ready`/`close` — all
//! state here (connection states, in-flight queues, metadata) is accessed
//! without locking under that rule (`spec.md` §5). `wakeup` is the one
//! exception: callable from any thread to unblock a blocking `poll`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{info, warn};

use crate::core::errors::BrokerError;

use super::metadata_client::{MetadataResponsePayload, MetadataUpdater};
use super::node::{ConnectionState, Initiator, InFlightQueue, InFlightRequest, Node, NodeConnection};
use super::selector::{Selector, SelectorEvent};

/// A request the caller hands to [`NetworkClient::send`].
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub node_id: i32,
    pub expects_response: bool,
    pub payload: Vec<u8>,
}

/// A response surfaced from [`NetworkClient::poll`]: either real bytes
/// from the wire, a synthetic success (for a no-response request whose
/// send completed), or a synthetic disconnect.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    pub node_id: i32,
    pub correlation_id: i32,
    pub body: Option<Vec<u8>>,
    pub disconnected: bool,
}

/// Reads a 4-byte big-endian correlation id off the front of a response
/// payload. The real wire codec (header = apiKey/apiVersion/clientId/
/// correlationId) is an external collaborator (`spec.md` §6); this is the
/// minimal stand-in the client needs to enforce the correlation invariant.
fn parse_correlation_id(payload: &[u8]) -> Option<i32> {
    payload
        .get(0..4)
        .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

struct NodeState {
    node: Node,
    conn: NodeConnection,
    inflight: InFlightQueue,
}

/// Configuration knobs for the client, mirrored from `src/config.rs`.
#[derive(Debug, Clone)]
pub struct NetworkClientConfig {
    pub max_in_flight_per_connection: usize,
    pub request_timeout_ms: i64,
    pub reconnect_backoff_ms: u64,
    pub metadata_max_age_ms: u64,
    pub metadata_refresh_backoff_ms: u64,
}

impl Default for NetworkClientConfig {
    fn default() -> Self {
        Self {
            max_in_flight_per_connection: 5,
            request_timeout_ms: 30_000,
            reconnect_backoff_ms: 50,
            metadata_max_age_ms: 300_000,
            metadata_refresh_backoff_ms: 250,
        }
    }
}

pub struct NetworkClient<S: Selector> {
    selector: S,
    config: NetworkClientConfig,
    nodes: HashMap<i32, NodeState>,
    metadata: MetadataUpdater,
    correlation_seq: AtomicI32,
    metadata_decoder: Box<dyn Fn(&[u8]) -> Option<MetadataResponsePayload> + Send>,
}

impl<S: Selector> NetworkClient<S> {
    pub fn new(selector: S, bootstrap_nodes: Vec<Node>, config: NetworkClientConfig) -> Self {
        let metadata_max_age = Duration::from_millis(config.metadata_max_age_ms);
        let refresh_backoff = Duration::from_millis(config.metadata_refresh_backoff_ms);
        let mut nodes = HashMap::new();
        for node in &bootstrap_nodes {
            nodes.insert(
                node.id,
                NodeState {
                    node: node.clone(),
                    conn: NodeConnection::new(config.reconnect_backoff_ms),
                    inflight: InFlightQueue::default(),
                },
            );
        }
        Self {
            selector,
            config,
            nodes,
            metadata: MetadataUpdater::new(bootstrap_nodes, metadata_max_age, refresh_backoff),
            correlation_seq: AtomicI32::new(0),
            metadata_decoder: Box::new(|_| None),
        }
    }

    /// Installs the decoder used to parse internal metadata-refresh
    /// response bodies into [`MetadataResponsePayload`]. Tests and the
    /// real wire layer both plug this in; the default is a no-op stub.
    pub fn set_metadata_decoder(
        &mut self,
        decoder: impl Fn(&[u8]) -> Option<MetadataResponsePayload> + Send + 'static,
    ) {
        self.metadata_decoder = Box::new(decoder);
    }

    /// Test seam: direct access to the injected selector, so a scripted
    /// fake can have events queued between `poll` calls.
    pub fn selector_mut(&mut self) -> &mut S {
        &mut self.selector
    }

    fn next_correlation_id(&self) -> i32 {
        self.correlation_seq.fetch_add(1, Ordering::Relaxed)
    }

    fn ensure_node(&mut self, node: &Node) -> &mut NodeState {
        self.nodes.entry(node.id).or_insert_with(|| NodeState {
            node: node.clone(),
            conn: NodeConnection::new(self.config.reconnect_backoff_ms),
            inflight: InFlightQueue::default(),
        })
    }

    fn can_send_request(&self, node_id: i32) -> bool {
        self.nodes
            .get(&node_id)
            .is_some_and(|n| n.conn.can_send_request() && n.inflight.len() < self.config.max_in_flight_per_connection)
    }

    /// A node with no `NodeState` yet has never been dialed, which is the
    /// same as being disconnected and not blacked out, so it is eligible
    /// for a fresh `initiateConnect` the same as an explicitly tracked one.
    fn can_connect(&self, node_id: i32, now: Instant) -> bool {
        self.nodes
            .get(&node_id)
            .is_none_or(|n| n.conn.can_connect(now))
    }

    /// Returns `canSendRequest(node)`; if false and the node is eligible,
    /// triggers a non-blocking `initiateConnect`.
    pub fn ready(&mut self, node: &Node, now: Instant) -> Result<bool, BrokerError> {
        if node.host.is_empty() {
            return Err(BrokerError::IllegalState("empty node".into()));
        }
        self.ensure_node(node);
        if self.can_send_request(node.id) {
            return Ok(true);
        }
        if self.can_connect(node.id, now) {
            let state = self.nodes.get_mut(&node.id).expect("ensured above");
            state.conn.connecting();
            if let Err(e) = self.selector.initiate_connect(node) {
                warn!(node_id = node.id, error = %e, "initiateConnect failed");
                state.conn.disconnected(now);
            }
        }
        Ok(false)
    }

    /// True iff metadata is not currently due for refresh *and*
    /// `canSendRequest(node)` — metadata refresh gets head-of-line
    /// priority over user sends.
    pub fn is_ready(&self, node: &Node, now: Instant) -> bool {
        !self.metadata.is_update_due(now) && self.can_send_request(node.id)
    }

    /// Sends a user request. Precondition: `canSendRequest(request.node)`.
    pub fn send(&mut self, request: OutboundRequest, now: Instant) -> Result<i32, BrokerError> {
        self.send_with_initiator(request, Initiator::User, now)
    }

    fn send_with_initiator(
        &mut self,
        request: OutboundRequest,
        initiator: Initiator,
        now: Instant,
    ) -> Result<i32, BrokerError> {
        if !self.can_send_request(request.node_id) {
            return Err(BrokerError::IllegalState(format!(
                "send on node {} that is not ready",
                request.node_id
            )));
        }
        let correlation_id = self.next_correlation_id();
        let state = self
            .nodes
            .get_mut(&request.node_id)
            .expect("can_send_request implies the node is known");
        state.inflight.push(InFlightRequest {
            node_id: request.node_id,
            correlation_id,
            expects_response: request.expects_response,
            sent_at: now,
            initiator,
        });
        // The client owns correlation-id assignment, so it stamps the
        // header itself rather than trusting the caller's payload to
        // already carry it (`parse_correlation_id` expects this framing
        // on the way back).
        let mut wire_payload = correlation_id.to_be_bytes().to_vec();
        wire_payload.extend_from_slice(&request.payload);
        self.selector.enqueue_send(request.node_id, wire_payload);
        Ok(correlation_id)
    }

    /// Iterates known nodes starting at a random offset; prefers a
    /// zero-in-flight `CONNECTED` node, else the non-blacked-out node
    /// with the fewest in-flight requests, else `None`.
    pub fn least_loaded_node(&self, now: Instant) -> Option<Node> {
        let ids: Vec<i32> = self.metadata.fetch_nodes().iter().map(|n| n.id).collect();
        if ids.is_empty() {
            return None;
        }
        let start = rand::thread_rng().gen_range(0..ids.len());
        let rotated = (0..ids.len()).map(|i| ids[(start + i) % ids.len()]);

        let mut best_fallback: Option<(i32, usize)> = None;
        for id in rotated {
            // A node known to metadata but with no `NodeState` yet has
            // never been dialed: it carries zero in-flight requests and
            // isn't blacked out, so it must stay eligible here — spec
            // §4.C: "may return a node with no existing connection."
            let (blacked_out, inflight_len, connected) = match self.nodes.get(&id) {
                Some(state) => (
                    state.conn.is_blacked_out(now),
                    state.inflight.len(),
                    state.conn.state == ConnectionState::Connected,
                ),
                None => (false, 0, false),
            };
            if inflight_len == 0 && connected {
                return self.metadata.fetch_nodes().iter().find(|n| n.id == id).cloned();
            }
            if !blacked_out && best_fallback.is_none_or(|(_, best)| inflight_len < best) {
                best_fallback = Some((id, inflight_len));
            }
        }
        best_fallback.and_then(|(id, _)| self.metadata.fetch_nodes().iter().find(|n| n.id == id).cloned())
    }

    /// Transport close: drains the node's in-flight queue into synthetic
    /// disconnect responses (swallowing internal requests) and marks the
    /// node disconnected.
    pub fn close(&mut self, node_id: i32, now: Instant) -> Vec<ClientResponse> {
        self.selector.close(node_id);
        self.drain_as_disconnect(node_id, now)
    }

    fn drain_as_disconnect(&mut self, node_id: i32, now: Instant) -> Vec<ClientResponse> {
        let Some(state) = self.nodes.get_mut(&node_id) else {
            return Vec::new();
        };
        state.conn.disconnected(now);
        let drained = state.inflight.drain();
        let mut responses = Vec::new();
        for req in drained {
            let swallowed = self.metadata.maybe_handle_disconnection(req.initiator);
            if !swallowed {
                responses.push(ClientResponse {
                    node_id,
                    correlation_id: req.correlation_id,
                    body: None,
                    disconnected: true,
                });
            }
        }
        responses
    }

    /// One I/O step: runs the metadata updater, drives the selector, and
    /// processes events in the contractual order (`spec.md` §4.C):
    /// completed sends, completed receives, disconnections, connections,
    /// timeouts. Returns the batch of user-visible responses.
    pub fn poll(&mut self, timeout_ms: i64, now: Instant) -> Result<Vec<ClientResponse>, BrokerError> {
        let metadata_timeout = self.run_metadata_update(now);
        let clipped = timeout_ms
            .min(metadata_timeout)
            .min(self.config.request_timeout_ms)
            .max(0);

        let events = self.selector.poll(Duration::from_millis(clipped as u64));

        let mut responses = Vec::new();
        let mut metadata_dirty = false;

        // a. Completed sends: retire no-response requests before any
        // later response for the same node can race them.
        for event in &events {
            if let SelectorEvent::SendComplete { node_id } = event {
                if let Some(state) = self.nodes.get_mut(node_id) {
                    let should_pop = state.inflight.front().is_some_and(|f| !f.expects_response);
                    if should_pop {
                        if let Some(req) = state.inflight.pop_front() {
                            responses.push(ClientResponse {
                                node_id: *node_id,
                                correlation_id: req.correlation_id,
                                body: None,
                                disconnected: false,
                            });
                        }
                    }
                }
            }
        }

        // b. Completed receives: FIFO pop, validate correlation id.
        for event in &events {
            if let SelectorEvent::Receive { node_id, payload } = event {
                let Some(state) = self.nodes.get_mut(node_id) else {
                    continue;
                };
                let Some(req) = state.inflight.pop_front() else {
                    continue;
                };
                let incoming_id = parse_correlation_id(payload);
                if incoming_id != Some(req.correlation_id) {
                    return Err(BrokerError::IllegalState(format!(
                        "correlation id mismatch on node {node_id}: expected {}, got {:?}",
                        req.correlation_id, incoming_id
                    )));
                }
                let body = payload.get(4..).unwrap_or(&[]).to_vec();
                let decoded = (self.metadata_decoder)(&body);
                let swallowed =
                    self.metadata
                        .maybe_handle_completed_receive(req.initiator, now, decoded);
                if !swallowed {
                    responses.push(ClientResponse {
                        node_id: *node_id,
                        correlation_id: req.correlation_id,
                        body: Some(body),
                        disconnected: false,
                    });
                }
            }
        }

        // c. Disconnections.
        for event in &events {
            if let SelectorEvent::Disconnected { node_id } = event {
                responses.extend(self.drain_as_disconnect(*node_id, now));
                metadata_dirty = true;
            }
        }

        // d. Connections.
        for event in &events {
            if let SelectorEvent::Connected { node_id } = event {
                if let Some(state) = self.nodes.get_mut(node_id) {
                    state.conn.connected();
                    info!(node_id = *node_id, "connection established");
                }
            }
        }

        // e. Timeouts.
        let timeout = Duration::from_millis(self.config.request_timeout_ms.max(0) as u64);
        let timed_out: Vec<i32> = self
            .nodes
            .iter()
            .filter(|(_, s)| {
                s.inflight
                    .iter()
                    .any(|r| now.saturating_duration_since(r.sent_at) > timeout)
            })
            .map(|(id, _)| *id)
            .collect();
        for node_id in timed_out {
            warn!(node_id, "request timeout, closing connection");
            self.selector.close(node_id);
            responses.extend(self.drain_as_disconnect(node_id, now));
            metadata_dirty = true;
        }

        if metadata_dirty {
            self.metadata.request_update();
        }

        Ok(responses)
    }

    fn run_metadata_update(&mut self, now: Instant) -> i64 {
        // Resolve the candidate node and its sendability/connectability up
        // front so the updater's closures can stay `FnOnce`/`FnMut` over
        // plain bools instead of re-entering `self` mutably.
        let candidate = self.least_loaded_node(now);
        let sendable = candidate.as_ref().is_some_and(|n| self.can_send_request(n.id));
        let connectable = candidate.as_ref().is_some_and(|n| self.can_connect(n.id, now));

        let mut to_send: Option<i32> = None;
        let mut to_connect: Option<Node> = None;

        let delay = self.metadata.maybe_update(
            now,
            || candidate.clone(),
            |id| sendable && candidate.as_ref().is_some_and(|n| n.id == id),
            |id| connectable && candidate.as_ref().is_some_and(|n| n.id == id),
            |id| to_send = Some(id),
            |node| to_connect = Some(node.clone()),
        );

        if let Some(node_id) = to_send {
            // Empty body: the client stamps the correlation-id header
            // itself in `send_with_initiator`. The real metadata-request
            // body (topic filter, etc.) is an external wire concern.
            let _ = self.send_with_initiator(
                OutboundRequest {
                    node_id,
                    expects_response: true,
                    payload: Vec::new(),
                },
                Initiator::Internal,
                now,
            );
        }
        if let Some(node) = to_connect {
            let _ = self.ready(&node, now);
        }

        delay
    }
}
