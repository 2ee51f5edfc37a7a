//! Cadence SDK
//!
//! Shared library providing the capability contract and the value types that
//! flow between the conductor and capabilities. The engine and every capability
//! implementation depend on this crate.

/// Capability trait and execution context
pub mod capability;

/// Context entries and read-views
pub mod context;

/// Error types and handling
pub mod errors;

/// Plan and policy types
pub mod types;

// Re-export commonly used types
pub use capability::{
    AvailableContext, Capability, CapabilityError, CapabilityOutcome, ClassifierGuide,
    ErrorContext, ExampleStep, LabeledExample, OrchestratorGuide,
};
pub use context::{
    ContextEntry, ContextPayload, ContextSummary, DetailView, FieldInfo, JsonPayload,
};
pub use errors::{CadenceErrorExt, EngineError};
pub use types::{ErrorClassification, PlannedStep, RetryPolicy, Severity, StepInput};
