// src/core/client/mod.rs

//! The asynchronous (poll-driven, non-coroutine) network client,
//! `spec.md` §4.C.

pub mod metadata_client;
pub mod network_client;
pub mod node;
pub mod selector;

pub use metadata_client::{ClusterMetadata, MetadataResponsePayload, MetadataUpdater, PartitionMetadata};
pub use network_client::{ClientResponse, NetworkClient, NetworkClientConfig, OutboundRequest};
pub use node::{ConnectionState, InFlightQueue, InFlightRequest, Initiator, Node, NodeConnection};
pub use selector::{FakeSelector, MioSelector, Selector, SelectorEvent};
