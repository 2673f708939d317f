//! Error types for Cadence core configuration

use thiserror::Error;

/// Result type alias for configuration-time operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while assembling an activity from its configuration.
///
/// These indicate a workload-definition or adapter defect, not a transient
/// backend condition. None of them are retryable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    // === Sequencing ===
    /// Sequence built from an empty dispenser list
    #[error("op sequence requires at least one dispenser")]
    EmptySequence,

    /// A dispenser was configured with weight zero
    #[error("dispenser at index {index} has zero weight")]
    ZeroWeight { index: usize },

    // === Op model ===
    /// An adapter resolved an op that exposes no executable capability
    #[error("op for cycle {cycle} exposes no executable capability")]
    NoOpCapability { cycle: u64 },

    // === Activity parameters ===
    /// max_tries must allow at least one attempt
    #[error("max_tries must be at least 1")]
    ZeroMaxTries,

    /// At least one worker is required to run cycles
    #[error("worker count must be at least 1")]
    ZeroWorkers,
}
