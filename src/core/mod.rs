// src/core/mod.rs

//! The central module containing the broker's core logic and data
//! structures: replica placement, partition leader selection, the
//! network client, cluster metadata, and the coordination-store
//! boundary.

pub mod client;
pub mod coordination;
pub mod election;
pub mod errors;
pub mod metadata;
pub mod placement;

pub use errors::BrokerError;
pub use metadata::{Assignment, BrokerMetadata, ClusterState, LeaderAndIsr, PartitionKey};
