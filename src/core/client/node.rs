// src/core/client/node.rs

//! Node identity and per-connection state owned exclusively by the
//! network client (`spec.md` §3, §5: single-threaded, no locking).

use std::collections::VecDeque;
use std::time::Instant;

use crate::core::errors::BrokerError;

/// A broker endpoint as seen by the client, distinct from
/// [`crate::core::metadata::BrokerMetadata`] (which carries placement's
/// rack tag, not a host/port the client can dial).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    pub id: i32,
    pub host: String,
    pub port: u16,
}

impl Node {
    pub fn new(id: i32, host: impl Into<String>, port: u16) -> Result<Self, BrokerError> {
        let host = host.into();
        if host.is_empty() {
            return Err(BrokerError::Configuration(
                "node host must not be empty".into(),
            ));
        }
        Ok(Self { id, host, port })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The connection state machine for one node. `BlackedOut` is a soft,
/// derived sub-state of `Disconnected` (see [`ConnectionState::is_blacked_out`])
/// rather than a state transitions target in its own right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Per-node connection bookkeeping: state, backoff, and whether the
/// channel is ready for application traffic (vs. still mid-handshake).
#[derive(Debug, Clone)]
pub struct NodeConnection {
    pub state: ConnectionState,
    pub channel_ready: bool,
    pub last_disconnect: Option<Instant>,
    pub reconnect_backoff_ms: u64,
}

impl NodeConnection {
    pub fn new(reconnect_backoff_ms: u64) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            channel_ready: false,
            last_disconnect: None,
            reconnect_backoff_ms,
        }
    }

    pub fn connecting(&mut self) {
        self.state = ConnectionState::Connecting;
        self.channel_ready = false;
    }

    pub fn connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.channel_ready = true;
    }

    pub fn disconnected(&mut self, now: Instant) {
        self.state = ConnectionState::Disconnected;
        self.channel_ready = false;
        self.last_disconnect = Some(now);
    }

    /// True iff `DISCONNECTED` and still within the reconnect backoff window.
    pub fn is_blacked_out(&self, now: Instant) -> bool {
        self.state == ConnectionState::Disconnected
            && self
                .last_disconnect
                .is_some_and(|t| now.saturating_duration_since(t).as_millis()
                    < self.reconnect_backoff_ms as u128)
    }

    /// `DISCONNECTED` and not currently blacked out: eligible for a new
    /// `initiateConnect`.
    pub fn can_connect(&self, now: Instant) -> bool {
        self.state == ConnectionState::Disconnected && !self.is_blacked_out(now)
    }

    /// Connected at the transport level *and* channel-ready (handshake
    /// complete): the only state from which a send is legal.
    pub fn can_send_request(&self) -> bool {
        self.state == ConnectionState::Connected && self.channel_ready
    }
}

/// Who initiated a request: a user-visible `send`, or an internal request
/// (currently only metadata refreshes) that must never be handed back to
/// the caller's response callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initiator {
    User,
    Internal,
}

/// One outstanding request, queued FIFO per node.
#[derive(Debug, Clone)]
pub struct InFlightRequest {
    pub node_id: i32,
    pub correlation_id: i32,
    pub expects_response: bool,
    pub sent_at: Instant,
    pub initiator: Initiator,
}

/// The FIFO in-flight queue for one node, bounded by
/// `max_in_flight_per_connection`.
#[derive(Debug, Default)]
pub struct InFlightQueue {
    queue: VecDeque<InFlightRequest>,
}

impl InFlightQueue {
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn push(&mut self, req: InFlightRequest) {
        self.queue.push_back(req);
    }

    pub fn pop_front(&mut self) -> Option<InFlightRequest> {
        self.queue.pop_front()
    }

    pub fn front(&self) -> Option<&InFlightRequest> {
        self.queue.front()
    }

    pub fn drain(&mut self) -> Vec<InFlightRequest> {
        self.queue.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InFlightRequest> {
        self.queue.iter()
    }
}
