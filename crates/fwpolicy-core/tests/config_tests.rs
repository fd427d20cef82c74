//! Integration tests for configuration

use fwpolicy_core::{EngineConfig, Error};
use std::path::PathBuf;

#[test]
fn test_toml_roundtrip() {
    let mut config = EngineConfig::default();
    config.cache.domain_capacity = 128;
    config.persistence.path = Some(PathBuf::from("/var/lib/fwpolicy/store.json"));
    config.logging.json_format = true;

    let toml = config.to_toml().unwrap();
    let parsed = EngineConfig::from_toml(&toml).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_toml_parse_partial() {
    let toml_content = r#"
[cache]
ip_capacity = 42

[logging]
level = "debug"
"#;
    let config = EngineConfig::from_toml(toml_content).unwrap();
    assert_eq!(config.cache.ip_capacity, 42);
    assert_eq!(config.cache.domain_capacity, 5000);
    assert_eq!(config.logging.level, "debug");
    assert!(config.validate().is_ok());
}

#[test]
fn test_toml_parse_invalid() {
    assert!(matches!(
        EngineConfig::from_toml("this is not [valid toml"),
        Err(Error::TomlParse(_))
    ));
    assert!(EngineConfig::from_toml("[cache]\ndomain_capacity = \"many\"").is_err());
}

#[test]
fn test_load_and_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("fwpolicy.toml");

    let mut config = EngineConfig::default();
    config.logging.level = "warn".to_string();
    config.save(&path).unwrap();

    let loaded = EngineConfig::load(&path).unwrap();
    assert_eq!(loaded.logging.level, "warn");
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = EngineConfig::load(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(Error::ConfigNotFound { .. })));
}

#[test]
fn test_validation() {
    let mut config = EngineConfig::default();
    config.cache.domain_capacity = 0;
    assert!(matches!(config.validate(), Err(Error::ConfigValue { .. })));

    let mut config = EngineConfig::default();
    config.persistence.path = Some(PathBuf::new());
    assert!(config.validate().is_err());
}
