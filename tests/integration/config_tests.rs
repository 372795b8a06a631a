use dupecache::config::{Config, ConfigError, ConfigOverrides};
use dupecache::pool::QueueOrder;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn test_config_load_from_env() {
    // Private prefix so parallel tests loading DUPECACHE_ are unaffected
    std::env::set_var("DCITEST_WORKERS", "9");
    std::env::set_var("DCITEST_QUEUE_ORDER", "fifo");
    std::env::set_var("DCITEST_SWEEP_ON_START", "false");

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("DCITEST_"))
        .extract()
        .unwrap();

    assert_eq!(config.workers, 9);
    assert_eq!(config.queue_order, QueueOrder::Fifo);
    assert!(!config.sweep_on_start);
    assert_eq!(config.max_queue_depth, 64);

    std::env::remove_var("DCITEST_WORKERS");
    std::env::remove_var("DCITEST_QUEUE_ORDER");
    std::env::remove_var("DCITEST_SWEEP_ON_START");
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let toml_content = r#"
workers = 6
max_queue_depth = 16
min_size = 4096
queue_order = "fifo"
cache_path = "/var/tmp/dupecache.db"
output = "dupes.txt"
background_interval_secs = 120
follow_symlinks = true
"#;
    fs::write(&config_path, toml_content).unwrap();

    let config = Config::load(Some(&config_path), &ConfigOverrides::default()).unwrap();

    assert_eq!(config.workers, 6);
    assert_eq!(config.max_queue_depth, 16);
    assert_eq!(config.min_size, 4096);
    assert_eq!(config.queue_order, QueueOrder::Fifo);
    assert_eq!(config.cache_path, Some(PathBuf::from("/var/tmp/dupecache.db")));
    assert_eq!(config.output, PathBuf::from("dupes.txt"));
    assert!(config.follow_symlinks);
    assert!(!config.skip_hidden);
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("absent.toml");

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .extract()
        .unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_cli_overrides_win() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "workers = 6\nmin_size = 4096\nskip_hidden = true\n").unwrap();

    let overrides = ConfigOverrides {
        workers: Some(1),
        skip_hidden: Some(false),
        report_group_limit: Some(10),
        ..ConfigOverrides::default()
    };
    let config = Config::load(Some(&config_path), &overrides).unwrap();

    assert_eq!(config.workers, 1);
    assert_eq!(config.min_size, 4096);
    assert!(!config.skip_hidden);
    assert_eq!(config.report_group_limit, Some(10));
}

#[test]
fn test_invalid_values_are_rejected_on_load() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "max_queue_depth = 0\n").unwrap();

    let err = Config::load(Some(&config_path), &ConfigOverrides::default()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { key: "max_queue_depth", .. }));
    assert!(err.to_string().contains("max_queue_depth"));
}

#[test]
fn test_malformed_toml_is_load_error() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "workers = [1, 2").unwrap();

    let err = Config::load(Some(&config_path), &ConfigOverrides::default()).unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)));
}

#[test]
fn test_loaded_config_drives_coordinator_and_walker() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        "workers = 5\nreport_interval_secs = 2\nreport_group_limit = 3\nskip_hidden = true\n",
    )
    .unwrap();

    let config = Config::load(Some(&config_path), &ConfigOverrides::default()).unwrap();
    let coordinator = config.coordinator_config();
    assert_eq!(coordinator.workers, 5);
    assert_eq!(coordinator.report_interval, Duration::from_secs(2));
    assert_eq!(coordinator.report_group_limit, Some(3));
    assert_eq!(coordinator.exclude, vec![PathBuf::from("Result.txt")]);

    let walker = config.walker_config();
    assert!(walker.skip_hidden);
    assert!(!walker.follow_symlinks);
}
