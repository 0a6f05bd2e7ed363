// src/config.rs

//! Loads, resolves, and validates broker configuration: placement
//! defaults, network-client tuning, and per-topic unclean-election
//! policy. Same `RawConfig` → `Config` → `validate()` pipeline shape as
//! the teacher's server configuration, scoped down to what this crate's
//! components actually consume.

use std::collections::HashMap;
use std::fs;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use crate::core::placement::RackAwareMode;

/// Tunables for [`crate::core::placement::assign`] and
/// [`crate::core::placement::add_partitions`].
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PlacementConfig {
    #[serde(default = "default_replication_factor")]
    pub default_replication_factor: usize,
    #[serde(default)]
    pub rack_aware_mode: RackAwareMode,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            default_replication_factor: default_replication_factor(),
            rack_aware_mode: RackAwareMode::default(),
        }
    }
}

fn default_replication_factor() -> usize {
    3
}

/// Tunables for [`crate::core::client::NetworkClient`], mirrored onto
/// [`crate::core::client::NetworkClientConfig`] at startup.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClientConfig {
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight_per_connection: usize,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: i64,
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
    #[serde(default = "default_metadata_max_age_ms")]
    pub metadata_max_age_ms: u64,
    #[serde(default = "default_metadata_refresh_backoff_ms")]
    pub metadata_refresh_backoff_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_in_flight_per_connection: default_max_in_flight(),
            request_timeout_ms: default_request_timeout_ms(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            metadata_max_age_ms: default_metadata_max_age_ms(),
            metadata_refresh_backoff_ms: default_metadata_refresh_backoff_ms(),
        }
    }
}

fn default_max_in_flight() -> usize {
    5
}
fn default_request_timeout_ms() -> i64 {
    30_000
}
fn default_reconnect_backoff_ms() -> u64 {
    50
}
fn default_metadata_max_age_ms() -> u64 {
    300_000
}
fn default_metadata_refresh_backoff_ms() -> u64 {
    250
}

/// `ClusterConfig`-style node-timeout / quorum knobs, scoped here to the
/// one thing the leader selector needs from them: whether unclean
/// (out-of-ISR) elections are permitted, globally and per topic.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ElectionConfig {
    #[serde(default)]
    pub unclean_leader_election_enable: bool,
    #[serde(default)]
    pub unclean_leader_election_topic_overrides: HashMap<String, bool>,
}

impl ElectionConfig {
    pub fn unclean_election_enabled_for(&self, topic: &str) -> bool {
        self.unclean_leader_election_topic_overrides
            .get(topic)
            .copied()
            .unwrap_or(self.unclean_leader_election_enable)
    }
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    placement: PlacementConfig,
    #[serde(default)]
    client: ClientConfig,
    #[serde(default)]
    election: ElectionConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// The final, validated configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub log_level: String,
    pub placement: PlacementConfig,
    pub client: ClientConfig,
    pub election: ElectionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            placement: PlacementConfig::default(),
            client: ClientConfig::default(),
            election: ElectionConfig::default(),
        }
    }
}

impl Config {
    /// Reads and parses a TOML file, then validates the result.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let raw: RawConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;

        let config = Config {
            log_level: raw.log_level,
            placement: raw.placement,
            client: raw.client,
            election: raw.election,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.placement.default_replication_factor == 0 {
            return Err(anyhow!("placement.default_replication_factor cannot be 0"));
        }
        if self.client.max_in_flight_per_connection == 0 {
            return Err(anyhow!("client.max_in_flight_per_connection cannot be 0"));
        }
        if self.client.request_timeout_ms <= 0 {
            return Err(anyhow!("client.request_timeout_ms must be positive"));
        }
        if self.client.metadata_max_age_ms == 0 {
            return Err(anyhow!("client.metadata_max_age_ms cannot be 0"));
        }

        if self.election.unclean_leader_election_enable {
            warn!(
                "unclean_leader_election_enable is set: offline elections may choose a leader \
                 outside the in-sync replica set, which can silently drop committed data"
            );
        }

        Ok(())
    }
}
