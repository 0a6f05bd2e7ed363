// tests/config_test.rs

//! Config file loading and validation.

use std::io::Write;

use brokerkit::config::{Config, RackAwareMode};
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn defaults_apply_when_sections_are_absent() {
    let file = write_config("");
    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();

    assert_eq!(config.log_level, "info");
    assert_eq!(config.placement.default_replication_factor, 3);
    assert_eq!(config.placement.rack_aware_mode, RackAwareMode::Disabled);
    assert_eq!(config.client.max_in_flight_per_connection, 5);
    assert_eq!(config.client.request_timeout_ms, 30_000);
    assert!(!config.election.unclean_leader_election_enable);
}

#[test]
fn parses_overrides_from_each_section() {
    let file = write_config(
        r#"
        log_level = "debug"

        [placement]
        default_replication_factor = 5
        rack_aware_mode = "enforced"

        [client]
        max_in_flight_per_connection = 10
        request_timeout_ms = 5000

        [election]
        unclean_leader_election_enable = true

        [election.unclean_leader_election_topic_overrides]
        critical-topic = false
        "#,
    );
    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();

    assert_eq!(config.log_level, "debug");
    assert_eq!(config.placement.default_replication_factor, 5);
    assert_eq!(config.placement.rack_aware_mode, RackAwareMode::Enforced);
    assert_eq!(config.client.max_in_flight_per_connection, 10);
    assert_eq!(config.client.request_timeout_ms, 5000);
    assert!(config.election.unclean_election_enabled_for("some-other-topic"));
    assert!(!config.election.unclean_election_enabled_for("critical-topic"));
}

#[test]
fn rejects_zero_replication_factor() {
    let file = write_config("[placement]\ndefault_replication_factor = 0\n");
    let err = Config::from_file(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("default_replication_factor"));
}

#[test]
fn rejects_zero_max_in_flight() {
    let file = write_config("[client]\nmax_in_flight_per_connection = 0\n");
    let err = Config::from_file(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("max_in_flight_per_connection"));
}

#[test]
fn rejects_non_positive_request_timeout() {
    let file = write_config("[client]\nrequest_timeout_ms = 0\n");
    let err = Config::from_file(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("request_timeout_ms"));
}

#[test]
fn rejects_zero_metadata_max_age() {
    let file = write_config("[client]\nmetadata_max_age_ms = 0\n");
    let err = Config::from_file(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("metadata_max_age_ms"));
}

#[test]
fn missing_file_is_an_error() {
    let err = Config::from_file("/nonexistent/path/to/config.toml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn malformed_toml_is_an_error() {
    let file = write_config("this is not valid toml [[[");
    let err = Config::from_file(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse TOML"));
}
