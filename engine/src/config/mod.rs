//! Configuration management
//!
//! This module handles loading, validation, and management of the Cadence configuration.
//! Configuration is stored in TOML format at ~/.cadence/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **llm**: Completion backend selection and provider settings
//! - **orchestration**: Phase bypass switches, planning mode and phase limits
//! - **retry**: Default retry policy for built-in capabilities
//!
//! # Examples
//!
//! ```no_run
//! use cadence_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration from default location
//! let config = Config::load_or_create()?;
//!
//! println!("Data dir: {:?}", config.core.data_dir);
//! println!("Planning mode: {}", config.orchestration.planning_mode);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use sdk::types::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// Completion backend configuration
    pub llm: LLMConfig,

    /// Conductor phase settings
    #[serde(default)]
    pub orchestration: OrchestrationConfig,

    /// Default retry policy for built-in capabilities
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Core engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// LLM provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Default LLM provider (ollama)
    pub default_provider: String,

    /// Per-request timeout for completion calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// Ollama provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

/// Conductor phase configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Skip the extraction completion and use the raw history as the task
    #[serde(default)]
    pub bypass_task_extraction: bool,

    /// Skip classification and activate every registered capability
    #[serde(default)]
    pub bypass_classification: bool,

    /// Require approval of every plan before it executes
    #[serde(default)]
    pub planning_mode: bool,

    /// Maximum concurrent classifier completions
    #[serde(default = "default_classifier_concurrency")]
    pub classifier_concurrency: usize,

    /// Planning completions attempted before the turn fails
    #[serde(default = "default_max_planning_attempts")]
    pub max_planning_attempts: u32,

    /// Number of trailing messages given to the extractor
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Points kept when summary views downsample a numeric series
    #[serde(default = "default_summary_sample_points")]
    pub summary_sample_points: usize,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            bypass_task_extraction: false,
            bypass_classification: false,
            planning_mode: false,
            classifier_concurrency: default_classifier_concurrency(),
            max_planning_attempts: default_max_planning_attempts(),
            history_window: default_history_window(),
            summary_sample_points: default_summary_sample_points(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.cadence/data")
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "qwen2.5-coder:7b".to_string()
}

fn default_classifier_concurrency() -> usize {
    5
}

fn default_max_planning_attempts() -> u32 {
    2
}

fn default_history_window() -> usize {
    10
}

fn default_summary_sample_points() -> usize {
    sdk::context::DEFAULT_SAMPLE_POINTS
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                data_dir: default_data_dir(),
            },
            llm: LLMConfig {
                default_provider: "ollama".to_string(),
                request_timeout_secs: default_request_timeout_secs(),
                ollama: OllamaConfig::default(),
            },
            orchestration: OrchestrationConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.cadence/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load from `path` when given, otherwise from the default location
    pub fn load(path: Option<&Path>) -> Result<Self, EngineError> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load_or_create(),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default();
        let toml_string = config.to_toml()?;

        config.validate_and_process()?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, EngineError> {
        toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Get the default configuration file path (~/.cadence/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".cadence").join("config.toml"))
    }

    /// SQLite file holding pending plans
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("cadence.db")
    }

    /// Check field values without touching the file system
    pub fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["ollama"];
        if !valid_providers.contains(&self.llm.default_provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid default provider '{}'. Must be one of: {}",
                self.llm.default_provider,
                valid_providers.join(", ")
            )));
        }

        if self.llm.request_timeout_secs == 0 {
            return Err(EngineError::Config(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }

        let orchestration = &self.orchestration;
        if orchestration.classifier_concurrency == 0 {
            return Err(EngineError::Config(
                "classifier_concurrency must be at least 1".to_string(),
            ));
        }
        if orchestration.max_planning_attempts == 0 {
            return Err(EngineError::Config(
                "max_planning_attempts must be at least 1".to_string(),
            ));
        }
        if orchestration.history_window == 0 {
            return Err(EngineError::Config(
                "history_window must be at least 1".to_string(),
            ));
        }
        if orchestration.summary_sample_points < 2 {
            return Err(EngineError::Config(
                "summary_sample_points must be at least 2".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(EngineError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(self.retry.backoff_multiplier >= 1.0) {
            return Err(EngineError::Config(
                "retry.backoff_multiplier must be >= 1.0".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate and process configuration
    ///
    /// Validates field values, expands ~ in the data directory and creates it
    /// if it doesn't exist.
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        self.validate()?;

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
