//! # Cadence Core
//!
//! Core building blocks for the Cadence load-generation engine.
//!
//! This crate provides the pieces the cycle execution engine is assembled
//! from:
//! - `Op` - The closed set of executable operation variants
//! - `OpDispenser` - Factory turning a cycle number into an op
//! - `OpSequence` - Weighted, deterministic cycle-to-dispenser mapping
//! - `HandlerChain` - Pluggable fault classification policy
//! - `MetricsRegistry` / `ActivityInstruments` - Shared timers and histograms
//!
//! ## Architecture
//!
//! ```text
//!   cycle ──► OpSequence ──► OpDispenser ──► Op ──► backend
//!                                 │                   │
//!                                 │    fault ──► HandlerChain ──► ErrorDetail
//!                                 │                   │
//!                                 └──── ActivityInstruments ◄────┘
//! ```
//!
//! The engine itself (the per-worker action loop) lives in `cadence-engine`
//! and consumes everything here through `Arc`-shared handles.

pub mod classify;
pub mod error;
pub mod instruments;
pub mod op;
pub mod sequence;

pub use classify::*;
pub use error::*;
pub use instruments::*;
pub use op::*;
pub use sequence::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::classify::{ErrorDetail, FaultHandler, HandlerChain, MatchHandler, Severity};
    pub use crate::error::{ConfigError, Result};
    pub use crate::instruments::{ActivityInstruments, CycleHistogram, MetricsRegistry, Timer};
    pub use crate::op::{Op, OpDispenser, OpKind, OpOutput};
    pub use crate::sequence::OpSequence;
}
