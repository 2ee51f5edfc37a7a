//! Cadence Engine Library
//!
//! Core of the Cadence orchestration engine. Used by the `cadence` binary and
//! by integration tests.

/// Built-in capabilities and the capability registry
pub mod capabilities;

/// CLI interface module
pub mod cli;

/// Turn orchestration: extraction, classification, planning, execution
pub mod conductor;

/// Configuration management module
pub mod config;

/// Per-session typed context store
pub mod context;

/// Database persistence module
pub mod db;

/// Command handlers module
pub mod handlers;

/// LLM provider abstraction layer
pub mod llm;

/// Telemetry and Observability
pub mod telemetry;
