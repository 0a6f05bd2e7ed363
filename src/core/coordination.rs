// src/core/coordination.rs

//! The coordination-store interface (`spec.md` §6): specified at the
//! boundary only. No real ZooKeeper-style wire client is implemented here
//! — that is an external collaborator — but the trait and an in-memory
//! implementation let the rest of the crate (and its tests) depend on the
//! interface rather than a concrete store.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::core::errors::BrokerError;

/// A coordination-store path, watch, and read/write surface. Modeled on
/// the subset of ZooKeeper operations a broker actually needs — nothing
/// transactional, no ACLs.
pub trait CoordinationStore: Send + Sync {
    fn exists(&self, path: &str) -> Result<bool, BrokerError>;
    fn read_data(&self, path: &str) -> Result<Vec<u8>, BrokerError>;
    fn create_persistent(&self, path: &str, data: Vec<u8>) -> Result<(), BrokerError>;
    fn update_persistent(&self, path: &str, data: Vec<u8>) -> Result<(), BrokerError>;
    /// Creates a persistent sequential znode under `parent`, returning the
    /// full path including the assigned sequence suffix.
    fn create_persistent_sequential(&self, parent: &str, data: Vec<u8>) -> Result<String, BrokerError>;
    fn delete_path_recursive(&self, path: &str) -> Result<(), BrokerError>;
    /// Registers interest in changes under `path`. The in-memory store
    /// resolves this synchronously against its current snapshot; a real
    /// client would push asynchronous watch events instead.
    fn watch(&self, path: &str) -> Result<Vec<String>, BrokerError>;
}

#[derive(Default)]
struct InMemoryState {
    nodes: BTreeMap<String, Vec<u8>>,
    sequence_counters: BTreeMap<String, u64>,
}

/// An in-memory [`CoordinationStore`] for tests and the [`Admin`] handle.
/// Single-process only; never durable across restarts.
#[derive(Default)]
pub struct InMemoryCoordinationStore {
    state: Mutex<InMemoryState>,
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn children_of<'a>(state: &'a InMemoryState, parent: &str) -> Vec<String> {
        let prefix = if parent.ends_with('/') {
            parent.to_string()
        } else {
            format!("{parent}/")
        };
        state
            .nodes
            .keys()
            .filter(|k| k.starts_with(&prefix) && !k[prefix.len()..].contains('/'))
            .cloned()
            .collect()
    }
}

impl CoordinationStore for InMemoryCoordinationStore {
    fn exists(&self, path: &str) -> Result<bool, BrokerError> {
        let state = self.state.lock().expect("coordination store lock poisoned");
        Ok(state.nodes.contains_key(path))
    }

    fn read_data(&self, path: &str) -> Result<Vec<u8>, BrokerError> {
        let state = self.state.lock().expect("coordination store lock poisoned");
        state
            .nodes
            .get(path)
            .cloned()
            .ok_or_else(|| BrokerError::IllegalState(format!("no znode at {path}")))
    }

    fn create_persistent(&self, path: &str, data: Vec<u8>) -> Result<(), BrokerError> {
        let mut state = self.state.lock().expect("coordination store lock poisoned");
        if state.nodes.contains_key(path) {
            return Err(BrokerError::IllegalState(format!("znode already exists at {path}")));
        }
        debug!(path, "coordination store: create_persistent");
        state.nodes.insert(path.to_string(), data);
        Ok(())
    }

    fn update_persistent(&self, path: &str, data: Vec<u8>) -> Result<(), BrokerError> {
        let mut state = self.state.lock().expect("coordination store lock poisoned");
        if !state.nodes.contains_key(path) {
            return Err(BrokerError::IllegalState(format!("no znode at {path}")));
        }
        state.nodes.insert(path.to_string(), data);
        Ok(())
    }

    fn create_persistent_sequential(&self, parent: &str, data: Vec<u8>) -> Result<String, BrokerError> {
        let mut state = self.state.lock().expect("coordination store lock poisoned");
        let counter = state.sequence_counters.entry(parent.to_string()).or_insert(0);
        let seq = *counter;
        *counter += 1;
        let path = format!("{parent}/{seq:010}");
        state.nodes.insert(path.clone(), data);
        Ok(path)
    }

    fn delete_path_recursive(&self, path: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock().expect("coordination store lock poisoned");
        let prefix = format!("{path}/");
        state.nodes.retain(|k, _| *k != path && !k.starts_with(&prefix));
        Ok(())
    }

    fn watch(&self, path: &str) -> Result<Vec<String>, BrokerError> {
        let state = self.state.lock().expect("coordination store lock poisoned");
        Ok(Self::children_of(&state, path))
    }
}

/// The broker-internal administrative operations that, per Design Notes
/// §9 ("Global admin helpers ... become methods on an explicit `Admin`
/// handle"), are collapsed out of free functions and onto one handle
/// holding the coordination store.
pub struct Admin {
    store: Arc<dyn CoordinationStore>,
}

impl Admin {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    pub fn topic_exists(&self, topic: &str) -> Result<bool, BrokerError> {
        self.store.exists(&format!("/topics/{topic}"))
    }

    pub fn create_topic(&self, topic: &str, assignment_json: Vec<u8>) -> Result<(), BrokerError> {
        if self.topic_exists(topic)? {
            return Err(BrokerError::TopicAlreadyExists(topic.to_string()));
        }
        self.store.create_persistent(&format!("/topics/{topic}"), assignment_json)
    }

    pub fn mark_topic_for_deletion(&self, topic: &str) -> Result<(), BrokerError> {
        let path = format!("/admin/delete_topics/{topic}");
        if self.store.exists(&path)? {
            return Err(BrokerError::AlreadyMarkedForDeletion(topic.to_string()));
        }
        self.store.create_persistent(&path, Vec::new())
    }
}
