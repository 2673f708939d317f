//! # Cadence Engine
//!
//! The cycle execution engine: per-worker action loops that bind, execute,
//! retry, classify, and record operations against an arbitrary backend.
//!
//! An [`Activity`](activity::Activity) owns the shared pieces (op sequence,
//! handler chain, instruments) and hands out one [`CycleAction`](action::CycleAction)
//! per worker slot. The [`motor`] module drives actions from a shared cycle
//! source on a pool of worker threads; each worker runs one cycle at a time,
//! synchronously, and workers never coordinate beyond the shared
//! instrumentation sink.

pub mod action;
pub mod activity;
pub mod motor;

pub use action::*;
pub use activity::*;
pub use motor::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::action::{CycleAction, EngineError};
    pub use crate::activity::{Activity, ActivityConfig};
    pub use crate::motor::{run, CycleSource, IntervalCycleSource, RunSummary};
}
