use std::path::Path;

use pmoconfig::Config;
use serde_yaml::Value;
use tempfile::TempDir;

#[test]
fn test_defaults_are_written_back() {
    let dir = TempDir::new().unwrap();
    let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();

    assert_eq!(config.get_log_min_level().unwrap(), "INFO");
    assert!(config.get_log_enable_console().unwrap());
    assert!(dir.path().join("config.yaml").exists());
    assert_eq!(
        config.get_value(&["cue", "reconcile", "poll_interval_secs"]).unwrap(),
        Value::Number(5.into())
    );
}

#[test]
fn test_set_value_persists() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().to_str().unwrap();

    let config = Config::load_config(path).unwrap();
    config
        .set_value(&["cue", "catalog", "path"], Value::String("/tmp/songs.json".into()))
        .unwrap();

    let reloaded = Config::load_config(path).unwrap();
    assert_eq!(
        reloaded.get_value(&["cue", "catalog", "path"]).unwrap(),
        Value::String("/tmp/songs.json".into())
    );
    // Untouched keys keep their defaults
    assert_eq!(
        reloaded.get_value(&["cue", "shortcuts", "next"]).unwrap(),
        Value::Number(106.into())
    );
}

#[test]
fn test_user_file_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("config.yaml"),
        "cue:\n  features:\n    auto_fit: false\n",
    )
    .unwrap();

    let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
    assert_eq!(
        config.get_value(&["cue", "features", "auto_fit"]).unwrap(),
        Value::Bool(false)
    );
    assert_eq!(
        config.get_value(&["cue", "features", "resume_stuck_video"]).unwrap(),
        Value::Bool(false)
    );
}

#[test]
fn test_missing_path_is_an_error() {
    let dir = TempDir::new().unwrap();
    let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
    assert!(config.get_value(&["cue", "nope"]).is_err());
}

#[test]
fn test_config_file_lives_in_config_dir() {
    let dir = TempDir::new().unwrap();
    let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();

    assert_eq!(Path::new(config.get_config_dir()), dir.path());
    assert_eq!(config.get_config_file(), dir.path().join("config.yaml"));
}
