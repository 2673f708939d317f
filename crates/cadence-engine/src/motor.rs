//! Worker motor: drives per-slot actions from a shared cycle source.
//!
//! The motor spawns one OS thread per worker slot. Each worker pulls cycle
//! numbers from the source and runs them synchronously, one at a time, so
//! attempts for one worker's cycles never interleave. Shutdown is
//! cooperative: the source simply stops handing out cycles and in-flight
//! cycles finish naturally.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::action::EngineError;
use crate::activity::Activity;

/// Hands out cycle numbers to workers. Ascending per worker, no overlap.
pub trait CycleSource: Send + Sync {
    /// The next cycle to run, or `None` when the run is over
    fn next_cycle(&self) -> Option<u64>;
}

/// Atomic `[start, end)` interval; each cycle is handed out exactly once.
pub struct IntervalCycleSource {
    next: AtomicU64,
    end: u64,
}

impl IntervalCycleSource {
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
            end,
        }
    }
}

impl CycleSource for IntervalCycleSource {
    fn next_cycle(&self) -> Option<u64> {
        let cycle = self.next.fetch_add(1, Ordering::Relaxed);
        (cycle < self.end).then_some(cycle)
    }
}

/// Aggregate outcome of one motor run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub cycles_run: u64,
    pub ok_cycles: u64,
    pub error_cycles: u64,
    /// Status code of the last nonzero cycle, 0 if every cycle succeeded
    pub last_code: i32,
}

impl RunSummary {
    fn merge(&mut self, other: &RunSummary) {
        self.cycles_run += other.cycles_run;
        self.ok_cycles += other.ok_cycles;
        self.error_cycles += other.error_cycles;
        if other.last_code != 0 {
            self.last_code = other.last_code;
        }
    }
}

/// Run an activity's cycles to completion across its configured workers.
///
/// A bind-time fault aborts the worker that hit it and propagates; execution
/// faults are already folded into status codes by the action loop.
pub fn run<V>(activity: &Activity<V>, source: &dyn CycleSource) -> Result<RunSummary, EngineError> {
    let workers = activity.config().workers;
    info!(
        activity = %activity.config().name,
        workers,
        max_tries = activity.config().max_tries,
        "starting motor"
    );

    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for slot in 0..workers {
            let mut action = activity.action(slot);
            handles.push(scope.spawn(move || -> Result<RunSummary, EngineError> {
                let mut local = RunSummary::default();
                while let Some(cycle) = source.next_cycle() {
                    let code = action.run_cycle(cycle)?;
                    local.cycles_run += 1;
                    if code == 0 {
                        local.ok_cycles += 1;
                    } else {
                        local.error_cycles += 1;
                        local.last_code = code;
                    }
                }
                debug!(slot, cycles = local.cycles_run, "worker drained cycle source");
                Ok(local)
            }));
        }

        let mut total = RunSummary::default();
        for (slot, handle) in handles.into_iter().enumerate() {
            let local = handle
                .join()
                .map_err(|_| EngineError::WorkerPanicked { slot })??;
            total.merge(&local);
        }

        info!(
            cycles = total.cycles_run,
            errors = total.error_cycles,
            last_code = total.last_code,
            "motor finished"
        );
        Ok(total)
    })
}
