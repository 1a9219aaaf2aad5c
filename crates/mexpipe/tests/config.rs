use mexpipe::{ApiFlavour, BridgeConfig};
use std::fs;
use tempfile::TempDir;

#[test]
fn yaml_file_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mexpipe.yaml");
    fs::write(
        &path,
        "api: compat\nhooks:\n  print_setter: blur_set_print\nlogging:\n  forward_to_host: true\n",
    )
    .unwrap();

    let config = BridgeConfig::from_file(&path).unwrap();
    assert_eq!(config.api, ApiFlavour::Compat);
    assert_eq!(config.hooks.print_setter, "blur_set_print");
    assert_eq!(config.hooks.error_setter, "halide_set_error_handler");
    assert!(config.logging.forward_to_host);
    assert_eq!(config.logging.level, "warn");
}

#[test]
fn json_file_is_parsed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mexpipe.json");
    fs::write(&path, r#"{"api": "large", "logging": {"level": "debug"}}"#).unwrap();

    let config = BridgeConfig::from_file(&path).unwrap();
    assert_eq!(config.api, ApiFlavour::Large);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn unknown_extension_falls_back_to_either_format() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mexpipe.conf");
    fs::write(&path, r#"{"logging": {"level": "trace"}}"#).unwrap();
    assert_eq!(BridgeConfig::from_file(&path).unwrap().logging.level, "trace");
}

#[test]
fn unreadable_and_malformed_files_are_errors() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.yaml");
    let err = BridgeConfig::from_file(&missing).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));

    let bad = dir.path().join("bad.json");
    fs::write(&bad, "{ not json").unwrap();
    let err = BridgeConfig::from_file(&bad).unwrap_err();
    assert!(err.to_string().contains("Failed to parse JSON config"));
}
