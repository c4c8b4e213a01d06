use std::{env, fs};

use scorecache_engine::config::{ConfigError, loader::load_config};

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    // Create a temporary TOML configuration file
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("scorecache.toml");

    let toml_content = r#"
[logging]
level = "debug"

[cache]
max_entries = 500
sweep_interval_secs = 15
compression_threshold_bytes = 2048

[redis]
enabled = true
url = "redis://cache.internal:6379"
key_prefix = "scores:"
op_timeout_ms = 100

[warming]
startup_delay_secs = 2
refresh_interval_secs = 45
upcoming_days = 7
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses, unspecified fields keep their defaults
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.cache.max_entries, 500);
    assert_eq!(cfg.cache.sweep_interval_secs, 15);
    assert_eq!(cfg.cache.max_memory_bytes, 64 * 1024 * 1024);
    assert!(cfg.redis.enabled);
    assert_eq!(cfg.redis.key_prefix, "scores:");
    assert_eq!(cfg.redis.op_timeout_ms, 100);
    assert_eq!(cfg.redis.invalidation_channel, "scorecache:invalidate");
    assert_eq!(cfg.warming.upcoming_days, 7);
    assert!(cfg.warming.background_refresh_enabled);

    // 2) Env override should win over file
    unsafe {
        env::set_var("SCORECACHE__WARMING__REFRESH_INTERVAL_SECS", "90");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.warming.refresh_interval_secs, 90);
    // cleanup env var
    unsafe {
        env::remove_var("SCORECACHE__WARMING__REFRESH_INTERVAL_SECS");
    }

    // 3) Invalid config should error
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[warming]
upcoming_days = 30
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    match err {
        ConfigError::Validation(msg) => assert!(msg.contains("upcoming_days")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("absent.toml");

    let cfg = load_config(path.to_str()).expect("defaults are valid");
    assert!(!cfg.redis.enabled);
    assert!(cfg.cache.memory_enabled);
    assert_eq!(cfg.warming.upcoming_days, 3);
}
