//! Config 单元测试

use crate::util::config::{BuilderConfig, ConfigError};

#[test]
fn test_default_values() {
    let config = BuilderConfig::default();
    assert!(!config.checked_mode);
    assert!(config.strong_mode);
    assert!(config.use_field_guards);
    assert!(!config.emit_store_barriers);
    assert_eq!(config.first_block_id, 1);
    assert_eq!(config.osr_id, None);
}

#[test]
fn test_partial_document_uses_defaults() {
    let config = BuilderConfig::from_ron_str("(checked_mode: true, enable_asserts: true)").unwrap();
    assert!(config.checked_mode);
    assert!(config.enable_asserts);
    assert!(config.strong_mode);
    assert!(!config.track_context_levels);
}

#[test]
fn test_invalid_document() {
    let err = BuilderConfig::from_ron_str("(checked_mode: 3").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_save_and_load_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("builder.ron");

    let config = BuilderConfig {
        osr_id: Some(7),
        ..BuilderConfig::debug()
    };
    config.save(&path).unwrap();

    let loaded = BuilderConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = BuilderConfig::load(&dir.path().join("absent.ron")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}
