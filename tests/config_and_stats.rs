//! Config validation, round-tripping, and the `stats()` shape (spec §6/§8).

mod support;

use websqlite3::{Client, Config, Error, Priority};

#[test]
fn rejects_max_size_below_min_size() {
    let json = r#"{
        "connection": {"database": ":memory:"},
        "pool": {"min_size": 5, "max_size": 1}
    }"#;
    let err = Config::from_json_str(json).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn applies_documented_defaults() {
    let json = r#"{"connection": {"database": ":memory:"}}"#;
    let config = Config::from_json_str(json).unwrap();
    assert_eq!(config.pool.min_size, 1);
    assert_eq!(config.pool.max_size, 10);
    assert_eq!(config.pool.max_idle_time, 600.0);
    assert_eq!(config.pool.connection_timeout, 30.0);
    assert_eq!(config.connection.timeout, 5.0);
    assert_eq!(config.connection.cached_statements, 128);
    assert!(!config.connection.uri);
}

#[test]
fn server_block_is_accepted_and_ignored() {
    let json = r#"{
        "connection": {"database": ":memory:"},
        "server": {"host": "0.0.0.0", "port": 5432, "charset": "utf8", "autocommit": true}
    }"#;
    let config = Config::from_json_str(json).unwrap();
    assert_eq!(config.server.host.as_deref(), Some("0.0.0.0"));
    assert_eq!(config.server.port, Some(5432));
}

#[test]
fn unknown_fields_are_ignored() {
    let json = r#"{
        "connection": {"database": ":memory:", "totally_unknown_field": 42},
        "pool": {"also_unknown": true}
    }"#;
    assert!(Config::from_json_str(json).is_ok());
}

#[test]
fn yaml_and_json_agree_on_the_same_config() {
    let json = r#"{"connection": {"database": "widgets.db"}, "pool": {"min_size": 2, "max_size": 8}}"#;
    let yaml = "connection:\n  database: widgets.db\npool:\n  min_size: 2\n  max_size: 8\n";
    assert_eq!(
        Config::from_json_str(json).unwrap(),
        Config::from_yaml_str(yaml).unwrap()
    );
}

#[test]
fn round_trips_through_serde_json() {
    let json = r#"{"connection": {"database": "widgets.db", "isolation_level": "IMMEDIATE"}, "pool": {"min_size": 3, "max_size": 9, "echo": true}}"#;
    let config = Config::from_json_str(json).unwrap();
    let serialized = serde_json::to_string(&config).unwrap();
    let reparsed: Config = serde_json::from_str(&serialized).unwrap();
    assert_eq!(config, reparsed);
}

#[tokio::test]
async fn stats_shape_matches_the_documented_keys() -> anyhow::Result<()> {
    let client = Client::connect(support::memory_config(1, 5)).await?;
    client
        .fetchone("SELECT 1", vec![], Priority::Normal, None)
        .await?;

    let stats = client.stats();
    assert!(stats.initialized);
    assert!(stats.pool.size >= 1);
    assert_eq!(stats.scheduler.workers, 5);

    let value = serde_json::to_value(&stats)?;
    for key in ["initialized", "pool", "executor", "config"] {
        assert!(value.get(key).is_some(), "missing top-level key {key}");
    }
    for key in ["size", "in_use", "available", "created_total", "closed_total", "waiters"] {
        assert!(value["pool"].get(key).is_some(), "missing pool key {key}");
    }
    for key in [
        "queue_size",
        "workers",
        "active_workers",
        "total_executed",
        "total_failed",
        "total_timed_out",
    ] {
        assert!(value["executor"].get(key).is_some(), "missing executor key {key}");
    }

    client.close().await;
    Ok(())
}
