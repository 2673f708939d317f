//! Cycle-to-op sequencing via a precomputed weighted schedule.
//!
//! An [`OpSequence`] maps a cycle number to a dispenser in O(1). It is built
//! once per configuration epoch from `(dispenser, weight)` pairs and is
//! immutable afterwards; hot-swapping means building a new sequence and
//! publishing the whole `Arc`, never mutating one in use.
//!
//! Identical cycle number + identical configuration always selects the same
//! dispenser, which is what makes runs deterministic and replayable.

use std::sync::Arc;

use crate::error::{ConfigError, Result};

/// Ordered, weighted, indexable mapping from cycle numbers to dispensers.
///
/// Weights are reduced by their greatest common divisor, so `[2, 2]` yields
/// the same period-2 schedule as `[1, 1]`. The schedule interleaves entries
/// round-robin: weights `[3, 1]` produce `A B A A`, giving A three out of
/// every four cycles.
pub struct OpSequence<T: ?Sized> {
    schedule: Vec<Arc<T>>,
}

impl<T: ?Sized> OpSequence<T> {
    /// Build a sequence from `(dispenser, weight)` pairs.
    ///
    /// Rejects an empty list and zero weights; both indicate a
    /// workload-definition defect.
    pub fn from_weighted(items: Vec<(Arc<T>, u64)>) -> Result<Self> {
        if items.is_empty() {
            return Err(ConfigError::EmptySequence);
        }
        for (index, (_, weight)) in items.iter().enumerate() {
            if *weight == 0 {
                return Err(ConfigError::ZeroWeight { index });
            }
        }

        let divisor = items.iter().fold(0u64, |acc, (_, w)| gcd(acc, *w));
        let mut remaining: Vec<u64> = items.iter().map(|(_, w)| w / divisor).collect();
        let period: u64 = remaining.iter().sum();

        // Round-robin interleave: each pass takes one slot from every
        // dispenser that still has weight left.
        let mut schedule = Vec::with_capacity(period as usize);
        while (schedule.len() as u64) < period {
            for (index, left) in remaining.iter_mut().enumerate() {
                if *left > 0 {
                    schedule.push(Arc::clone(&items[index].0));
                    *left -= 1;
                }
            }
        }

        Ok(Self { schedule })
    }

    /// The dispenser responsible for `cycle`
    pub fn dispenser_for(&self, cycle: u64) -> &Arc<T> {
        let index = (cycle % self.schedule.len() as u64) as usize;
        &self.schedule[index]
    }

    /// Length of the repeating schedule (the reduced weight sum)
    pub fn period(&self) -> usize {
        self.schedule.len()
    }
}

impl<T: ?Sized> std::fmt::Debug for OpSequence<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpSequence")
            .field("period", &self.schedule.len())
            .finish()
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}
