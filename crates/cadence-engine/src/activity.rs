//! Activity assembly: configuration plus the shared pieces every worker uses.
//!
//! An activity owns one op sequence, one handler chain, and one metrics
//! registry for its whole run. Backend context (the "space": pools, prepared
//! statements, caches) is adapter-owned; dispensers capture it behind their
//! own `Arc` at construction, and the engine never touches it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use cadence_core::classify::HandlerChain;
use cadence_core::error::{ConfigError, Result};
use cadence_core::instruments::{ActivityInstruments, MetricsRegistry};
use cadence_core::op::OpDispenser;
use cadence_core::sequence::OpSequence;

use crate::action::CycleAction;

/// Activity parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// Activity name, used in logs
    pub name: String,

    /// Maximum attempts per op, inclusive and counted from 1
    pub max_tries: u32,

    /// Worker threads pulling cycles
    pub workers: usize,

    /// Cycles to run when driven end-to-end (the default source is [0, cycles))
    pub cycles: u64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            name: "activity".to_string(),
            max_tries: 10,
            workers: 1,
            cycles: 1000,
        }
    }
}

impl ActivityConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_tries == 0 {
            return Err(ConfigError::ZeroMaxTries);
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        Ok(())
    }
}

/// A configured activity: everything shared across worker slots.
pub struct Activity<V> {
    config: ActivityConfig,
    sequence: Arc<OpSequence<dyn OpDispenser<V>>>,
    handlers: Arc<HandlerChain>,
    registry: Arc<MetricsRegistry>,
    instruments: ActivityInstruments,
}

impl<V> Activity<V> {
    /// Assemble an activity from weighted dispensers and a handler chain.
    ///
    /// Fails fast on invalid configuration; nothing is retried at this stage.
    pub fn new(
        config: ActivityConfig,
        dispensers: Vec<(Arc<dyn OpDispenser<V>>, u64)>,
        handlers: HandlerChain,
    ) -> Result<Self> {
        config.validate()?;
        let sequence = Arc::new(OpSequence::from_weighted(dispensers)?);
        let registry = Arc::new(MetricsRegistry::new());
        let instruments = ActivityInstruments::register(&registry);

        Ok(Self {
            config,
            sequence,
            handlers: Arc::new(handlers),
            registry,
            instruments,
        })
    }

    /// Create the action for one worker slot
    pub fn action(&self, slot: usize) -> CycleAction<V> {
        CycleAction::new(
            slot,
            self.config.max_tries,
            Arc::clone(&self.sequence),
            Arc::clone(&self.handlers),
            self.instruments.clone(),
        )
    }

    pub fn config(&self) -> &ActivityConfig {
        &self.config
    }

    pub fn sequence(&self) -> &Arc<OpSequence<dyn OpDispenser<V>>> {
        &self.sequence
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    pub fn instruments(&self) -> &ActivityInstruments {
        &self.instruments
    }
}
