// ABOUTME: Tests for configuration loading and validation.
// ABOUTME: Verifies TOML parsing, env var overrides, tilde expansion, and rejected values.

use conductor_agent::BackendKind;
use conductor_core::config::{Config, LogFormat};
use serial_test::serial;
use std::io::Write;

/// Helper to clear all config-related env vars
fn clear_config_env_vars() {
    std::env::remove_var("CONDUCTOR_CONFIG_PATH");
    std::env::remove_var("CONDUCTOR_DATA_DIR");
    std::env::remove_var("CONDUCTOR_LOG_LEVEL");
    std::env::remove_var("CONDUCTOR_LOG_FORMAT");
    std::env::remove_var("CONDUCTOR_LOCALE");
}

fn write_config(dir: &tempfile::TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("conductor.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

#[test]
#[serial]
fn test_config_loads_from_toml_file() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[storage]
data_dir = "/srv/conductor"
database = "db/main.db"
history_file = "/var/lib/history.json"

[logging]
level = "debug"
format = "json"
file = true

[backends.codex]
binary = "/opt/bin/codex"
sandbox_mode = "read-only"

[tools]
locale = "de"

[[tools.mcp]]
serverName = "docs"
name = "search_docs"
description = "Search the handbook"

[[tools.mcp]]
server_name = "fs"
name = "read_file"

[metrics]
prometheus_listen = "127.0.0.1:9900"
"#,
    );
    std::env::set_var("CONDUCTOR_CONFIG_PATH", &path);

    let config = Config::load().unwrap();

    assert_eq!(config.data_dir(), std::path::PathBuf::from("/srv/conductor"));
    assert_eq!(
        config.database_path(),
        std::path::PathBuf::from("/srv/conductor/db/main.db")
    );
    assert_eq!(
        config.history_path(),
        std::path::PathBuf::from("/var/lib/history.json")
    );
    assert_eq!(config.log_dir(), std::path::PathBuf::from("/srv/conductor/logs"));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert!(config.logging.file);
    assert_eq!(config.tools.locale, "de");
    assert_eq!(config.tools.mcp.len(), 2);
    assert_eq!(config.tools.mcp[1].server_name, "fs");
    assert_eq!(config.metrics.prometheus_listen.as_deref(), Some("127.0.0.1:9900"));

    let defaults = config.backend_defaults().unwrap();
    assert_eq!(defaults[&BackendKind::Codex]["binary"], "/opt/bin/codex");

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_config_env_var_overrides() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[storage]
data_dir = "/original"

[logging]
level = "info"
"#,
    );
    std::env::set_var("CONDUCTOR_CONFIG_PATH", &path);
    std::env::set_var("CONDUCTOR_DATA_DIR", "/overridden");
    std::env::set_var("CONDUCTOR_LOG_LEVEL", "trace");
    std::env::set_var("CONDUCTOR_LOG_FORMAT", "JSON");
    std::env::set_var("CONDUCTOR_LOCALE", "fr");

    let config = Config::load().unwrap();

    assert_eq!(config.storage.data_dir, "/overridden");
    assert_eq!(config.logging.level, "trace");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.tools.locale, "fr");

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_invalid_log_format_env_is_rejected() {
    clear_config_env_vars();
    std::env::set_var("CONDUCTOR_DATA_DIR", "/tmp/conductor-test");
    std::env::set_var("CONDUCTOR_LOG_FORMAT", "xml");

    let result = Config::default().finalize();
    assert!(result.is_err());

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_tilde_expansion_in_data_dir() {
    clear_config_env_vars();
    std::env::set_var("CONDUCTOR_DATA_DIR", "~/conductor-data");

    let config = Config::default().finalize().unwrap();
    assert!(!config.storage.data_dir.starts_with('~'));
    assert!(config.storage.data_dir.ends_with("conductor-data"));

    clear_config_env_vars();
}

#[test]
fn test_defaults_without_file() {
    let config = Config::from_toml_str("").unwrap();
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert!(!config.logging.file);
    assert_eq!(config.tools.locale, "en");
    assert!(config.tools.mcp.is_empty());
    assert!(config.backends.is_empty());
    assert!(config.database_path().ends_with("conversations.db"));
    assert!(config.history_path().ends_with("history.json"));
}

#[test]
fn test_unknown_log_format_in_file_is_rejected() {
    let result = Config::from_toml_str("[logging]\nformat = \"xml\"\n");
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_unknown_backend_section_is_rejected() {
    clear_config_env_vars();
    let config = Config::from_toml_str("[backends.gemini]\nbinary = \"gemini\"\n").unwrap();
    assert!(config.finalize().is_err());
}

#[test]
#[serial]
fn test_invalid_metrics_address_is_rejected() {
    clear_config_env_vars();
    let config = Config::from_toml_str("[metrics]\nprometheus_listen = \"not-an-address\"\n").unwrap();
    assert!(config.finalize().is_err());
}

#[test]
#[serial]
fn test_mcp_server_with_slash_is_rejected() {
    clear_config_env_vars();
    let config = Config::from_toml_str(
        "[[tools.mcp]]\nserverName = \"a/b\"\nname = \"tool\"\n",
    )
    .unwrap();
    assert!(config.finalize().is_err());
}
