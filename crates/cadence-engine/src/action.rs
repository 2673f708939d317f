//! The per-worker action loop: bind, attempt with retries, classify,
//! record, expand.
//!
//! [`CycleAction::run_cycle`] is the engine's hot path, executed once per
//! cycle per worker. All shared handles (sequence, handler chain,
//! instruments) are resolved at construction so the loop itself performs no
//! lookups beyond `cycle % period`.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::trace;

use cadence_core::classify::HandlerChain;
use cadence_core::instruments::{ActivityInstruments, SIZE_THRESHOLD};
use cadence_core::op::{OpDispenser, OpKind};
use cadence_core::sequence::OpSequence;

/// Faults that escape the action loop to its caller.
///
/// Everything raised during execution goes through classification instead;
/// only bind-time faults propagate, because they indicate a
/// workload-definition defect rather than a live backend condition.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Op materialization failed; never retried
    #[error("while binding op for cycle {cycle} via '{dispenser}': {fault}")]
    Bind {
        cycle: u64,
        dispenser: String,
        fault: anyhow::Error,
    },

    /// A worker thread panicked; indicates a bug in an adapter or the engine
    #[error("worker {slot} panicked")]
    WorkerPanicked { slot: usize },
}

/// One worker's view of the execution engine.
///
/// Owns no cross-cycle state beyond its shared handles; a worker calls
/// [`run_cycle`](Self::run_cycle) synchronously, one cycle at a time.
pub struct CycleAction<V> {
    slot: usize,
    max_tries: u32,
    sequence: Arc<OpSequence<dyn OpDispenser<V>>>,
    handlers: Arc<HandlerChain>,
    instruments: ActivityInstruments,
}

impl<V> CycleAction<V> {
    pub fn new(
        slot: usize,
        max_tries: u32,
        sequence: Arc<OpSequence<dyn OpDispenser<V>>>,
        handlers: Arc<HandlerChain>,
        instruments: ActivityInstruments,
    ) -> Self {
        Self {
            slot,
            max_tries,
            sequence,
            handlers,
            instruments,
        }
    }

    /// Worker slot this action was created for
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Execute one cycle end-to-end and return its status code.
    ///
    /// The status is 0 when no attempt's fault was ever classified, and
    /// otherwise the code of the last classified fault in the cycle's
    /// expansion chain, even if a later retry of the same op succeeded.
    pub fn run_cycle(&mut self, cycle: u64) -> Result<i32, EngineError> {
        let bind_start = Instant::now();
        let dispenser = Arc::clone(self.sequence.dispenser_for(cycle));
        let bound = dispenser.materialize(cycle);
        // Bind time is recorded whether or not materialization worked.
        self.instruments.bind_timer.update(bind_start.elapsed());

        let op = bound.map_err(|fault| EngineError::Bind {
            cycle,
            dispenser: dispenser.name().to_string(),
            fault,
        })?;

        let mut code = 0i32;
        let mut result: Option<V> = None;
        let mut current = Some(op);

        while let Some(mut op) = current {
            let mut tries: u32 = 0;

            while tries < self.max_tries {
                tries += 1;
                dispenser.on_start(cycle);

                let started = Instant::now();
                let outcome = match &mut op.kind {
                    OpKind::Runnable(run) => run().map(|()| None),
                    OpKind::Cycle(apply) => apply(cycle).map(Some),
                    OpKind::Chaining(apply) => apply(result.as_ref()).map(Some),
                };
                let nanos = started.elapsed().as_nanos() as u64;

                self.instruments.execute_timer.update_nanos(nanos);
                self.instruments.result_timer.update_nanos(nanos);

                match outcome {
                    Ok(output) => {
                        self.instruments.result_success_timer.update_nanos(nanos);

                        let result_size = output.as_ref().map_or(0, |o| o.size);
                        if result_size > 0 {
                            let stretch = nanos / result_size;
                            self.instruments.stretch_histogram.record(stretch);

                            if result_size > SIZE_THRESHOLD {
                                self.instruments.large_latency_timer.update_nanos(nanos);
                                self.instruments.large_stretch_histogram.record(stretch);
                            } else {
                                self.instruments.small_latency_timer.update_nanos(nanos);
                                self.instruments.small_stretch_histogram.record(stretch);
                            }
                        }

                        dispenser.on_success(cycle, nanos, result_size);

                        if let Some(output) = output {
                            result = Some(output.value);
                        }
                        break;
                    }
                    Err(fault) => {
                        let detail = self.handlers.classify(&fault, cycle, nanos);
                        dispenser.on_error(cycle, nanos, &fault);
                        code = detail.code;
                        if !detail.retryable {
                            break;
                        }
                    }
                }
            }

            // One entry per op in the chain, value = attempts made for it.
            self.instruments.tries_histogram.record(u64::from(tries));

            current = op.expand.take().and_then(|next| next());
            if current.is_some() {
                trace!(cycle, slot = self.slot, "op expanded into follow-on op");
            }
        }

        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use anyhow::anyhow;
    use cadence_core::classify::MatchHandler;
    use cadence_core::instruments::MetricsRegistry;
    use cadence_core::op::{Op, OpOutput};

    #[derive(Debug, thiserror::Error)]
    #[error("transient backend fault")]
    struct TransientFault;

    #[derive(Debug, thiserror::Error)]
    #[error("permanent backend fault")]
    struct PermanentFault;

    struct FnDispenser<F>(F);

    impl<F> OpDispenser<u64> for FnDispenser<F>
    where
        F: Fn(u64) -> Result<Op<u64>, anyhow::Error> + Send + Sync,
    {
        fn materialize(&self, cycle: u64) -> Result<Op<u64>, anyhow::Error> {
            (self.0)(cycle)
        }

        fn name(&self) -> &str {
            "test"
        }
    }

    fn chain() -> HandlerChain {
        HandlerChain::new()
            .with(MatchHandler::for_type::<TransientFault>("transient", 7, true))
            .with(MatchHandler::for_type::<PermanentFault>("permanent", 42, false))
    }

    fn action_for<F>(
        dispenser: F,
        max_tries: u32,
    ) -> (CycleAction<u64>, Arc<MetricsRegistry>)
    where
        F: Fn(u64) -> Result<Op<u64>, anyhow::Error> + Send + Sync + 'static,
    {
        let dispenser: Arc<dyn OpDispenser<u64>> = Arc::new(FnDispenser(dispenser));
        let sequence = Arc::new(OpSequence::from_weighted(vec![(dispenser, 1)]).unwrap());
        let registry = Arc::new(MetricsRegistry::new());
        let instruments = cadence_core::instruments::ActivityInstruments::register(&registry);
        let action = CycleAction::new(0, max_tries, sequence, Arc::new(chain()), instruments);
        (action, registry)
    }

    #[test]
    fn test_successful_runnable_updates_each_timer_once() {
        let (mut action, registry) = action_for(|_| Ok(Op::runnable(|| Ok(()))), 3);

        let code = action.run_cycle(5).unwrap();

        assert_eq!(code, 0);
        assert_eq!(registry.timer("bind").count(), 1);
        assert_eq!(registry.timer("execute").count(), 1);
        assert_eq!(registry.timer("result").count(), 1);
        assert_eq!(registry.timer("result-success").count(), 1);
        assert_eq!(registry.histogram("tries").count(), 1);
        assert_eq!(registry.histogram("tries").max(), 1);
        // Runnable ops have result size zero, so no stretch entry.
        assert_eq!(registry.histogram("stretch").count(), 0);
    }

    #[test]
    fn test_retryable_fault_exhausts_max_tries() {
        let attempts = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&attempts);
        let (mut action, registry) = action_for(
            move |_| {
                let seen = Arc::clone(&seen);
                Ok(Op::runnable(move || {
                    seen.fetch_add(1, Ordering::Relaxed);
                    Err(anyhow!(TransientFault))
                }))
            },
            3,
        );

        let code = action.run_cycle(0).unwrap();

        assert_eq!(code, 7);
        assert_eq!(attempts.load(Ordering::Relaxed), 3);
        assert_eq!(registry.histogram("tries").count(), 1);
        assert_eq!(registry.histogram("tries").max(), 3);
        assert_eq!(registry.timer("result").count(), 3);
        assert_eq!(registry.timer("result-success").count(), 0);
    }

    #[test]
    fn test_non_retryable_fault_short_circuits() {
        let attempts = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&attempts);
        let (mut action, registry) = action_for(
            move |_| {
                let seen = Arc::clone(&seen);
                Ok(Op::runnable(move || {
                    seen.fetch_add(1, Ordering::Relaxed);
                    Err(anyhow!(PermanentFault))
                }))
            },
            5,
        );

        let code = action.run_cycle(0).unwrap();

        assert_eq!(code, 42);
        assert_eq!(attempts.load(Ordering::Relaxed), 1);
        assert_eq!(registry.histogram("tries").max(), 1);
    }

    #[test]
    fn test_max_tries_one_means_single_attempt() {
        let attempts = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&attempts);
        let (mut action, _) = action_for(
            move |_| {
                let seen = Arc::clone(&seen);
                Ok(Op::runnable(move || {
                    seen.fetch_add(1, Ordering::Relaxed);
                    Err(anyhow!(TransientFault))
                }))
            },
            1,
        );

        action.run_cycle(0).unwrap();
        assert_eq!(attempts.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_retried_op_keeps_last_classified_code() {
        // First attempt fails retryably, second succeeds. The cycle still
        // reports the classified code; success does not reset it.
        let attempts = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&attempts);
        let (mut action, registry) = action_for(
            move |_| {
                let seen = Arc::clone(&seen);
                Ok(Op::runnable(move || {
                    if seen.fetch_add(1, Ordering::Relaxed) == 0 {
                        Err(anyhow!(TransientFault))
                    } else {
                        Ok(())
                    }
                }))
            },
            3,
        );

        let code = action.run_cycle(0).unwrap();

        assert_eq!(code, 7);
        assert_eq!(attempts.load(Ordering::Relaxed), 2);
        assert_eq!(registry.histogram("tries").max(), 2);
        assert_eq!(registry.timer("result-success").count(), 1);
    }

    #[test]
    fn test_expansion_chain_gets_per_op_tries_and_last_code() {
        // op1 fails permanently (code 42), op2 succeeds, op3 fails with the
        // transient code. The last classified code wins.
        let (mut action, registry) = action_for(
            |_| {
                let op3: Op<u64> = Op::value(|_| Err(anyhow!(TransientFault)));
                let op2: Op<u64> = Op::runnable(|| Ok(())).with_expansion(move || Some(op3));
                let op1: Op<u64> =
                    Op::runnable(|| Err(anyhow!(PermanentFault))).with_expansion(move || Some(op2));
                Ok(op1)
            },
            2,
        );

        let code = action.run_cycle(0).unwrap();

        assert_eq!(code, 7);
        assert_eq!(registry.histogram("tries").count(), 3);
    }

    #[test]
    fn test_chain_result_flows_between_ops() {
        let (mut action, _) = action_for(
            |_| {
                let op3: Op<u64> = Op::chaining(|prev| {
                    assert_eq!(prev, Some(&11));
                    Ok(OpOutput::unsized_value(12))
                });
                let op2: Op<u64> = Op::chaining(|prev| {
                    assert_eq!(prev, Some(&10));
                    Ok(OpOutput::unsized_value(11))
                })
                .with_expansion(move || Some(op3));
                let op1: Op<u64> =
                    Op::value(|_| Ok(OpOutput::unsized_value(10))).with_expansion(move || Some(op2));
                Ok(op1)
            },
            1,
        );

        assert_eq!(action.run_cycle(0).unwrap(), 0);
    }

    #[test]
    fn test_first_chaining_op_sees_no_previous_result() {
        let (mut action, _) = action_for(
            |_| {
                Ok(Op::chaining(|prev| {
                    assert_eq!(prev, None);
                    Ok(OpOutput::unsized_value(1))
                }))
            },
            1,
        );

        assert_eq!(action.run_cycle(0).unwrap(), 0);
    }

    #[test]
    fn test_stretch_bucketing_by_result_size() {
        for (size, stretch, small, large) in
            [(0u64, 0u64, 0u64, 0u64), (5_000, 1, 1, 0), (20_000, 1, 0, 1)]
        {
            let (mut action, registry) = action_for(
                move |_| Ok(Op::value(move |_| Ok(OpOutput::new(0, size)))),
                1,
            );
            action.run_cycle(0).unwrap();

            assert_eq!(registry.histogram("stretch").count(), stretch, "size {size}");
            assert_eq!(
                registry.histogram("small-stretch").count(),
                small,
                "size {size}"
            );
            assert_eq!(
                registry.histogram("large-stretch").count(),
                large,
                "size {size}"
            );
            assert_eq!(registry.timer("small-latency").count(), small);
            assert_eq!(registry.timer("large-latency").count(), large);
        }
    }

    #[test]
    fn test_bind_fault_is_fatal_and_timed() {
        let (mut action, registry) =
            action_for(|cycle| Err(anyhow!("no op template for cycle {cycle}")), 3);

        let err = action.run_cycle(9).unwrap_err();

        match err {
            EngineError::Bind { cycle, ref dispenser, .. } => {
                assert_eq!(cycle, 9);
                assert_eq!(dispenser, "test");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(registry.timer("bind").count(), 1);
        assert_eq!(registry.timer("execute").count(), 0);
    }

    #[test]
    fn test_dispenser_hooks_fire_per_attempt() {
        struct HookDispenser {
            starts: AtomicU32,
            successes: AtomicU32,
            errors: AtomicU32,
        }

        impl OpDispenser<u64> for HookDispenser {
            fn materialize(&self, cycle: u64) -> Result<Op<u64>, anyhow::Error> {
                if cycle == 0 {
                    Ok(Op::runnable(|| Ok(())))
                } else {
                    Ok(Op::runnable(|| Err(anyhow!(TransientFault))))
                }
            }

            fn on_start(&self, _cycle: u64) {
                self.starts.fetch_add(1, Ordering::Relaxed);
            }

            fn on_success(&self, _cycle: u64, _nanos: u64, _size: u64) {
                self.successes.fetch_add(1, Ordering::Relaxed);
            }

            fn on_error(&self, _cycle: u64, _nanos: u64, _fault: &anyhow::Error) {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        let dispenser = Arc::new(HookDispenser {
            starts: AtomicU32::new(0),
            successes: AtomicU32::new(0),
            errors: AtomicU32::new(0),
        });
        let as_dyn: Arc<dyn OpDispenser<u64>> = Arc::clone(&dispenser) as _;
        let sequence = Arc::new(OpSequence::from_weighted(vec![(as_dyn, 1)]).unwrap());
        let registry = Arc::new(MetricsRegistry::new());
        let instruments = cadence_core::instruments::ActivityInstruments::register(&registry);
        let mut action = CycleAction::new(0, 3, sequence, Arc::new(chain()), instruments);

        action.run_cycle(0).unwrap();
        assert_eq!(dispenser.starts.load(Ordering::Relaxed), 1);
        assert_eq!(dispenser.successes.load(Ordering::Relaxed), 1);

        action.run_cycle(1).unwrap();
        assert_eq!(dispenser.starts.load(Ordering::Relaxed), 4);
        assert_eq!(dispenser.errors.load(Ordering::Relaxed), 3);
    }
}
