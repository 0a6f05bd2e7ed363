// src/core/errors.rs

//! Defines the primary error type shared by every core component.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing every failure kind the core
/// components can surface. Using `thiserror` gives clean error definitions
/// and automatic `Display`/`Error` impls without hand-written boilerplate.
#[derive(Error, Debug, Clone)]
pub enum BrokerError {
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    // --- Replica placement (Configuration errors, surfaced to caller) ---
    #[error("invalid configuration: {0}")]
    Configuration(String),

    // --- Leader selection ---
    #[error("election not needed: preferred replica is already the leader")]
    ElectionNotNeeded,

    #[error("no replica online: {0}")]
    NoReplicaOnline(String),

    #[error("state change failed: {0}")]
    StateChangeFailed(String),

    // --- Admin / topic lifecycle (idempotent admin operations) ---
    #[error("topic '{0}' already exists")]
    TopicAlreadyExists(String),

    #[error("topic '{0}' is already marked for deletion")]
    AlreadyMarkedForDeletion(String),

    // --- Transient metadata gaps ---
    #[error("leader not available for partition {0}")]
    LeaderNotAvailable(String),

    #[error("replica not available for partition {0}")]
    ReplicaNotAvailable(String),

    // --- Network client programming errors ---
    #[error("illegal state: {0}")]
    IllegalState(String),
}

impl From<std::io::Error> for BrokerError {
    fn from(e: std::io::Error) -> Self {
        BrokerError::Io(Arc::new(e))
    }
}

impl PartialEq for BrokerError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (BrokerError::Io(a), BrokerError::Io(b)) => a.to_string() == b.to_string(),
            (BrokerError::Configuration(a), BrokerError::Configuration(b)) => a == b,
            (BrokerError::NoReplicaOnline(a), BrokerError::NoReplicaOnline(b)) => a == b,
            (BrokerError::StateChangeFailed(a), BrokerError::StateChangeFailed(b)) => a == b,
            (BrokerError::TopicAlreadyExists(a), BrokerError::TopicAlreadyExists(b)) => a == b,
            (
                BrokerError::AlreadyMarkedForDeletion(a),
                BrokerError::AlreadyMarkedForDeletion(b),
            ) => a == b,
            (BrokerError::LeaderNotAvailable(a), BrokerError::LeaderNotAvailable(b)) => a == b,
            (BrokerError::ReplicaNotAvailable(a), BrokerError::ReplicaNotAvailable(b)) => a == b,
            (BrokerError::IllegalState(a), BrokerError::IllegalState(b)) => a == b,
            (BrokerError::ElectionNotNeeded, BrokerError::ElectionNotNeeded) => true,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl Eq for BrokerError {}
