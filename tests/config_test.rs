//! Integration tests for config.rs module

use std::io::Write;
use tempfile::NamedTempFile;
use warranty_watch::config::AppConfig;

fn yaml_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

fn configured() -> AppConfig {
    let mut config = AppConfig::default();
    config.remote.url = "https://abc.supabase.co".to_string();
    config.remote.anon_key = "public-anon-key".to_string();
    config
}

#[test]
fn test_default_config_values() {
    let config = AppConfig::default();

    assert_eq!(config.remote.request_timeout_secs, 30);
    assert_eq!(config.storage.bucket, "warranty-images");
    assert_eq!(config.storage.upload_timeout_secs, 10);
    assert_eq!(config.realtime.subscribe_timeout_secs, 10);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, "text");
    assert_eq!(config.logging.file_path, None);
}

#[test]
fn test_missing_credentials_fail_fast() {
    let mut config = configured();
    config.remote.anon_key = "  ".to_string();
    assert!(config.validate().is_err());

    let mut config = configured();
    config.remote.url = String::new();
    assert!(config.validate().is_err());
}

#[test]
fn test_non_http_url_rejected() {
    let mut config = configured();
    config.remote.url = "ftp://abc.supabase.co".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_zero_timeouts_rejected() {
    let mut config = configured();
    config.storage.upload_timeout_secs = 0;
    assert!(config.validate().is_err());

    let mut config = configured();
    config.realtime.subscribe_timeout_secs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_logging_rejected() {
    let mut config = configured();
    config.logging.level = "verbose".to_string();
    assert!(config.validate().is_err());

    let mut config = configured();
    config.logging.format = "xml".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_durations() {
    let config = configured();
    assert_eq!(config.upload_timeout().as_secs(), 10);
    assert_eq!(config.subscribe_timeout().as_secs(), 10);
    assert_eq!(config.request_timeout().as_secs(), 30);
}

#[test]
fn test_load_from_file_merges_defaults() {
    let file = yaml_file(
        "remote:\n  url: https://abc.supabase.co\n  anon_key: key-from-file\nstorage:\n  upload_timeout_secs: 25\n",
    );

    let config = AppConfig::load_from(file.path()).expect("config loads");

    assert_eq!(config.remote.url, "https://abc.supabase.co");
    assert_eq!(config.storage.upload_timeout_secs, 25);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_load_from_file_with_bad_values_fails() {
    let file = yaml_file(
        "remote:\n  url: https://abc.supabase.co\n  anon_key: key\nlogging:\n  level: loud\n",
    );
    assert!(AppConfig::load_from(file.path()).is_err());
}

#[test]
fn test_redacted_config_serializes_without_key() {
    let redacted = configured().redacted();
    assert_eq!(redacted.remote.anon_key, "publ…");

    let rendered = serde_yaml::to_string(&redacted).expect("yaml");
    assert!(!rendered.contains("public-anon-key"));
}
