//! Error types and handling
//!
//! This module provides the error types used throughout the Cadence engine.
//! All errors implement the `CadenceErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Error Categories
//!
//! - **Validation**: invalid plans, duplicate context keys, unresolved dependencies.
//!   Always fatal for the turn, never retried.
//! - **Capability**: failures raised by a capability after classification.
//! - **Infrastructure**: configuration, database, completion backend.

use thiserror::Error;

/// Trait for Cadence error extensions
///
/// Provides additional context for errors, including user-friendly hints and
/// recoverability information. All engine errors implement this trait.
pub trait CadenceErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain
    /// payload data or internal implementation details.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors may succeed on a later turn without code or plan
    /// changes. Validation and consistency errors are never recoverable.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{CadenceErrorExt, EngineError};
///
/// let error = EngineError::DuplicateKey {
///     context_type: "CURRENT_WEATHER".to_string(),
///     key: "weather_sf".to_string(),
/// };
/// assert!(!error.is_recoverable());
///
/// let error = EngineError::Completion("connection reset".to_string());
/// assert!(error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Completion backend errors
    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Turn cancelled")]
    Cancelled,

    // Context store errors
    #[error("Context entry already exists: {context_type}/{key}")]
    DuplicateKey { context_type: String, key: String },

    #[error("Context entry not found: {context_type}/{key}")]
    NotFound { context_type: String, key: String },

    // Registry errors
    #[error("Capability already registered: {0}")]
    DuplicateCapability(String),

    #[error("Invalid capability '{name}': {reason}")]
    InvalidCapability { name: String, reason: String },

    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    // Phase input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Planning errors
    #[error("Invalid plan at step '{step}': {reason}")]
    InvalidPlan { step: String, reason: String },

    #[error("Planning failed after {attempts} attempt(s): {reason}")]
    PlanningFailed { attempts: u32, reason: String },

    // Execution errors
    #[error("Step '{step}' is not ready: missing inputs {missing:?}")]
    Readiness { step: String, missing: Vec<String> },

    #[error("Step '{step}' declared output '{expected}' but capability produced '{actual}'")]
    OutputTypeMismatch {
        step: String,
        expected: String,
        actual: String,
    },

    #[error("Capability '{capability}' failed at step '{step}': {message}")]
    CapabilityFailed {
        capability: String,
        step: String,
        message: String,
    },

    #[error("Capability '{capability}' failed at step '{step}' after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        capability: String,
        step: String,
        attempts: u32,
        last_error: String,
    },

    // Approval errors
    #[error("Pending plan not found: {0}")]
    PendingPlanNotFound(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CadenceErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            // Infrastructure errors
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Database(_) => "Persistence failed. Check the data directory is writable",
            Self::Completion(_) => "The language model backend is unavailable. Try again",
            Self::Cancelled => "The request was cancelled",

            // Context store errors
            Self::DuplicateKey { .. } => "The plan tried to overwrite existing data",
            Self::NotFound { .. } => "Required data was not available",

            // Registry errors
            Self::DuplicateCapability(_) | Self::InvalidCapability { .. } => {
                "A capability is misconfigured. Check the registry setup"
            }
            Self::UnknownCapability(_) => "The requested capability is not available",

            Self::InvalidInput(_) => "The request could not be understood. Try rephrasing it",

            // Planning errors
            Self::InvalidPlan { .. } | Self::PlanningFailed { .. } => {
                "Could not build a valid plan. Try rephrasing the request"
            }

            // Execution errors
            Self::Readiness { .. } | Self::OutputTypeMismatch { .. } => {
                "Internal consistency error while executing the plan"
            }
            Self::CapabilityFailed { .. } => "A step of the plan failed",
            Self::RetriesExhausted { .. } => {
                "A step kept failing after several attempts. Try again later"
            }

            // Approval errors
            Self::PendingPlanNotFound(_) => "No pending request matches that id",

            Self::Serialization(_) => "Stored data could not be decoded",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Completion(_)
            | Self::Database(_)
            | Self::Cancelled
            | Self::RetriesExhausted { .. }
            | Self::Io(_) => true,

            // Validation and consistency errors are fatal for the turn
            _ => false,
        }
    }
}
