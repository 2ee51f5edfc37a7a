//! Integration tests for configuration management
//!
//! Loads real files from disk and checks validation, defaults and path
//! handling.

use cadence_engine::config::{Config, OrchestrationConfig};
use sdk::types::RetryPolicy;
use sdk::errors::EngineError;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_full_config_loads() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    let path = write_config(
        &dir,
        &format!(
            r#"
[core]
log_level = "debug"
data_dir = "{}"

[llm]
default_provider = "ollama"
request_timeout_secs = 30

[llm.ollama]
base_url = "http://127.0.0.1:11434"
model = "llama3.1:8b"

[orchestration]
bypass_task_extraction = false
bypass_classification = true
planning_mode = true
classifier_concurrency = 3
max_planning_attempts = 4
history_window = 6
summary_sample_points = 12

[retry]
max_attempts = 5
base_delay_ms = 250
backoff_multiplier = 3.0
max_delay_ms = 4000
"#,
            data_dir.display()
        ),
    );

    let config = Config::load_from_path(&path).unwrap();

    assert_eq!(config.core.log_level, "debug");
    assert_eq!(config.llm.request_timeout_secs, 30);
    assert_eq!(config.llm.ollama.model, "llama3.1:8b");
    assert!(config.orchestration.bypass_classification);
    assert!(config.orchestration.planning_mode);
    assert_eq!(config.orchestration.classifier_concurrency, 3);
    assert_eq!(config.orchestration.max_planning_attempts, 4);
    assert_eq!(config.orchestration.history_window, 6);
    assert_eq!(config.orchestration.summary_sample_points, 12);
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.backoff_multiplier, 3.0);

    // The data directory is created on load
    assert!(data_dir.is_dir());
    assert_eq!(config.database_path(), data_dir.join("cadence.db"));
}

#[test]
fn test_minimal_config_with_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        &format!(
            r#"
[core]
data_dir = "{}"

[llm]
default_provider = "ollama"
"#,
            dir.path().join("data").display()
        ),
    );

    let config = Config::load(Some(&path)).unwrap();

    assert_eq!(config.core.log_level, "info");
    assert_eq!(config.llm.ollama.base_url, "http://localhost:11434");
    assert_eq!(config.llm.request_timeout_secs, 120);
    assert_eq!(config.orchestration, OrchestrationConfig::default());
    assert_eq!(config.retry, RetryPolicy::default());
}

#[test]
fn test_invalid_log_level_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[core]
log_level = "verbose"

[llm]
default_provider = "ollama"
"#,
    );

    let err = Config::load_from_path(&path).unwrap_err();
    assert!(matches!(err, EngineError::Config(msg) if msg.contains("verbose")));
}

#[test]
fn test_unknown_provider_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[core]

[llm]
default_provider = "openai"
"#,
    );

    let err = Config::load_from_path(&path).unwrap_err();
    assert!(matches!(err, EngineError::Config(msg) if msg.contains("openai")));
}

#[test]
fn test_zero_ranges_rejected() {
    let dir = TempDir::new().unwrap();
    for (section, field) in [
        ("orchestration", "classifier_concurrency"),
        ("orchestration", "max_planning_attempts"),
        ("orchestration", "history_window"),
        ("retry", "max_attempts"),
    ] {
        let path = write_config(
            &dir,
            &format!(
                "[core]\n\n[llm]\ndefault_provider = \"ollama\"\n\n[{}]\n{} = 0\n",
                section, field
            ),
        );

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(
            matches!(&err, EngineError::Config(msg) if msg.contains(field)),
            "{} should be rejected, got {}",
            field,
            err
        );
    }
}

#[test]
fn test_malformed_toml_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[core\nlog_level = ");

    let err = Config::load_from_path(&path).unwrap_err();
    assert!(matches!(err, EngineError::Config(msg) if msg.contains("parse")));
}

#[test]
fn test_missing_file_rejected() {
    let dir = TempDir::new().unwrap();
    let err = Config::load_from_path(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}
