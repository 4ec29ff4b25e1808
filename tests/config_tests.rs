//! Tests for the typestate configuration builder and JSON loading

use std::time::Duration;

use kodegen_tools_harvest::config::HarvestConfig;
use tempfile::TempDir;

mod common;

#[test]
fn test_builder_defaults() {
    let (dir, config) = common::test_config();

    assert_eq!(config.storage_dir(), dir.path());
    assert_eq!(config.auto_checkpoint_interval(), 100);
    assert_eq!(config.checkpoint_keep_last(), 5);
    assert_eq!(config.metric_series_capacity(), 1000);
    assert_eq!(config.event_history_capacity(), 1000);
    assert_eq!(config.event_type_history_capacity(), 100);
    assert_eq!(config.subscriber_queue_capacity(), 1024);
    assert_eq!(config.substate_timeout(), Duration::from_secs(3600));
    assert_eq!(config.checkpoint_write_timeout(), Duration::from_secs(30));
    assert_eq!(config.default_metrics_window_secs(), 300);
    assert!(config.enable_event_metrics());
    assert_eq!(config.checkpoint_dir(), dir.path().join("checkpoints"));
    assert_eq!(config.iteration_dir(), dir.path().join("iterations"));
}

#[test]
fn test_builder_overrides() {
    let dir = TempDir::new().unwrap();
    let config = HarvestConfig::builder()
        .storage_dir(dir.path())
        .auto_checkpoint_interval(25)
        .checkpoint_keep_last(2)
        .metric_series_capacity(50)
        .substate_timeout_secs(5)
        .checkpoint_subdir("ckpt")
        .build()
        .unwrap();

    assert_eq!(config.auto_checkpoint_interval(), 25);
    assert_eq!(config.checkpoint_keep_last(), 2);
    assert_eq!(config.metric_series_capacity(), 50);
    assert_eq!(config.substate_timeout(), Duration::from_secs(5));
    assert_eq!(config.checkpoint_dir(), dir.path().join("ckpt"));
}

#[test]
fn test_builder_rejects_zero_capacity() {
    let dir = TempDir::new().unwrap();
    let result = HarvestConfig::builder()
        .storage_dir(dir.path())
        .metric_series_capacity(0)
        .build();
    assert!(result.is_err());

    let result = HarvestConfig::builder()
        .storage_dir(dir.path())
        .substate_timeout_secs(0)
        .build();
    assert!(result.is_err());
}

#[test]
fn test_from_json_file_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("harvest.json");
    let storage = dir.path().join("data");
    let raw = serde_json::json!({
        "storage_dir": storage,
        "checkpoint_keep_last": 3,
    });
    std::fs::write(&path, raw.to_string()).unwrap();

    let config = HarvestConfig::from_json_file(&path).unwrap();
    assert_eq!(config.storage_dir(), &storage);
    assert_eq!(config.checkpoint_keep_last(), 3);
    assert_eq!(config.auto_checkpoint_interval(), 100);
}

#[test]
fn test_from_json_file_rejects_invalid() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(HarvestConfig::from_json_file(&path).is_err());
    assert!(HarvestConfig::from_json_file(dir.path().join("missing.json")).is_err());
}
