//! Built-in diagnostic adapter: a simulated backend for exercising the
//! engine without any external system.
//!
//! Outcomes are seeded from the cycle number, so a rerun with the same
//! parameters replays the same faults and result sizes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use cadence_core::classify::{HandlerChain, MatchHandler};
use cadence_core::op::{Op, OpDispenser, OpOutput};

pub const TIMEOUT_CODE: i32 = 11;
pub const MALFORMED_CODE: i32 = 12;

/// Faults the simulated backend raises
#[derive(Debug, Error)]
pub enum DiagFault {
    /// Transient; cleared by a retry
    #[error("simulated timeout in cycle {cycle}")]
    Timeout { cycle: u64 },

    /// Permanent; retrying would not help
    #[error("simulated malformed request in cycle {cycle}")]
    Malformed { cycle: u64 },
}

/// Classification chain for [`DiagFault`]s
pub fn handler_chain() -> HandlerChain {
    HandlerChain::new()
        .with(MatchHandler::new("timeout", TIMEOUT_CODE, true, |fault| {
            matches!(fault.downcast_ref(), Some(DiagFault::Timeout { .. }))
        }))
        .with(MatchHandler::new(
            "malformed",
            MALFORMED_CODE,
            false,
            |fault| matches!(fault.downcast_ref(), Some(DiagFault::Malformed { .. })),
        ))
}

/// Stand-in for a backend space: the shared, read-only knobs every dispenser
/// holds, where a real adapter would keep its connection pool.
pub struct DiagSpace {
    pub op_latency: Duration,
    pub error_rate: f64,
    pub mean_result_size: u64,
}

/// Value-producing "read" with simulated latency and result sizes.
///
/// An injected timeout clears on the next attempt, exercising the retry
/// path to success.
pub struct DiagReadDispenser {
    space: Arc<DiagSpace>,
}

impl DiagReadDispenser {
    pub fn new(space: Arc<DiagSpace>) -> Self {
        Self { space }
    }
}

impl OpDispenser<u64> for DiagReadDispenser {
    fn materialize(&self, cycle: u64) -> anyhow::Result<Op<u64>> {
        let mut rng = StdRng::seed_from_u64(cycle);
        let mut failing_attempts = u32::from(rng.gen_bool(self.space.error_rate));
        let size = rng.gen_range(1..=self.space.mean_result_size.max(1) * 2);
        let latency = self.space.op_latency;

        Ok(Op::value(move |c| {
            std::thread::sleep(latency);
            if failing_attempts > 0 {
                failing_attempts -= 1;
                return Err(anyhow!(DiagFault::Timeout { cycle: c }));
            }
            Ok(OpOutput::new(c, size))
        }))
    }

    fn name(&self) -> &str {
        "diag-read"
    }
}

/// Fire-and-forget "write"; occasionally raises a permanent fault.
pub struct DiagWriteDispenser {
    space: Arc<DiagSpace>,
}

impl DiagWriteDispenser {
    pub fn new(space: Arc<DiagSpace>) -> Self {
        Self { space }
    }
}

impl OpDispenser<u64> for DiagWriteDispenser {
    fn materialize(&self, cycle: u64) -> anyhow::Result<Op<u64>> {
        let mut rng = StdRng::seed_from_u64(cycle ^ 0x9e37_79b9_7f4a_7c15);
        let malformed = rng.gen_bool(self.space.error_rate / 10.0);
        let latency = self.space.op_latency;

        Ok(Op::runnable(move || {
            std::thread::sleep(latency);
            if malformed {
                return Err(anyhow!(DiagFault::Malformed { cycle }));
            }
            Ok(())
        }))
    }

    fn name(&self) -> &str {
        "diag-write"
    }
}

/// Paged "scan": an initial read that expands into a fixed number of
/// chained continuation pages within the same cycle.
pub struct DiagScanDispenser {
    space: Arc<DiagSpace>,
    pages: u32,
}

impl DiagScanDispenser {
    pub fn new(space: Arc<DiagSpace>, pages: u32) -> Self {
        Self { space, pages }
    }
}

fn page_op(latency: Duration, size: u64, remaining: u32) -> Op<u64> {
    let op = Op::chaining(move |prev| {
        std::thread::sleep(latency);
        let rows_so_far = prev.copied().unwrap_or(0);
        Ok(OpOutput::new(rows_so_far + size, size))
    });
    if remaining > 1 {
        op.with_expansion(move || Some(page_op(latency, size, remaining - 1)))
    } else {
        op
    }
}

impl OpDispenser<u64> for DiagScanDispenser {
    fn materialize(&self, cycle: u64) -> anyhow::Result<Op<u64>> {
        let mut rng = StdRng::seed_from_u64(cycle.rotate_left(17));
        let size = rng.gen_range(1..=self.space.mean_result_size.max(1) * 2);
        let latency = self.space.op_latency;
        let pages = self.pages;

        let first = Op::value(move |_| {
            std::thread::sleep(latency);
            Ok(OpOutput::new(size, size))
        });
        Ok(if pages > 0 {
            first.with_expansion(move || Some(page_op(latency, size, pages)))
        } else {
            first
        })
    }

    fn name(&self) -> &str {
        "diag-scan"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> Arc<DiagSpace> {
        Arc::new(DiagSpace {
            op_latency: Duration::ZERO,
            error_rate: 0.5,
            mean_result_size: 1024,
        })
    }

    #[test]
    fn test_materialization_is_deterministic_per_cycle() {
        let dispenser = DiagReadDispenser::new(space());

        for cycle in 0..50 {
            let mut a = dispenser.materialize(cycle).unwrap();
            let mut b = dispenser.materialize(cycle).unwrap();

            let out_a = match &mut a.kind {
                cadence_core::op::OpKind::Cycle(f) => f(cycle),
                other => panic!("unexpected kind: {other:?}"),
            };
            let out_b = match &mut b.kind {
                cadence_core::op::OpKind::Cycle(f) => f(cycle),
                other => panic!("unexpected kind: {other:?}"),
            };
            assert_eq!(out_a.is_ok(), out_b.is_ok());
        }
    }

    #[test]
    fn test_timeout_clears_on_retry() {
        let dispenser = DiagReadDispenser::new(Arc::new(DiagSpace {
            op_latency: Duration::ZERO,
            error_rate: 1.0,
            mean_result_size: 8,
        }));

        let mut op = dispenser.materialize(1).unwrap();
        let apply = match &mut op.kind {
            cadence_core::op::OpKind::Cycle(f) => f,
            other => panic!("unexpected kind: {other:?}"),
        };

        let first = apply(1);
        assert!(first.unwrap_err().downcast_ref::<DiagFault>().is_some());
        assert!(apply(1).is_ok());
    }

    #[test]
    fn test_scan_expands_into_pages() {
        let dispenser = DiagScanDispenser::new(space(), 2);
        let mut op = dispenser.materialize(3).unwrap();

        let mut chain_len = 1;
        while let Some(next) = op.expand.take().and_then(|f| f()) {
            op = next;
            chain_len += 1;
        }
        assert_eq!(chain_len, 3);
    }

    #[test]
    fn test_handler_chain_codes() {
        let chain = handler_chain();

        let timeout = chain.classify(&anyhow!(DiagFault::Timeout { cycle: 1 }), 1, 10);
        assert_eq!(timeout.code, TIMEOUT_CODE);
        assert!(timeout.retryable);

        let malformed = chain.classify(&anyhow!(DiagFault::Malformed { cycle: 1 }), 1, 10);
        assert_eq!(malformed.code, MALFORMED_CODE);
        assert!(!malformed.retryable);
    }
}
