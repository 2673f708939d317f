//! Operation model: the closed set of executable op variants.
//!
//! A dispenser materializes one [`Op`] per cycle (or per expansion step).
//! Ops are short-lived: created fresh, consumed exactly once, then dropped.
//! The variant chosen at construction time decides how the engine invokes
//! the op, so the hot loop never inspects types at runtime.

use anyhow::Error;

/// The value and size metric produced by a successful op attempt.
///
/// `size` feeds stretch-latency bucketing (elapsed nanos divided by size).
/// A size of zero means "no measurable result" and records no stretch entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpOutput<V> {
    pub value: V,
    pub size: u64,
}

impl<V> OpOutput<V> {
    pub fn new(value: V, size: u64) -> Self {
        Self { value, size }
    }

    /// Output with no size metric (records no stretch entry)
    pub fn unsized_value(value: V) -> Self {
        Self { value, size: 0 }
    }
}

/// How the engine invokes an op. Exactly one variant per op.
pub enum OpKind<V> {
    /// Fire-and-forget side effect; result size is defined as zero.
    Runnable(Box<dyn FnMut() -> Result<(), Error> + Send>),

    /// Value-producing: maps the cycle number to a result and its size.
    Cycle(Box<dyn FnMut(u64) -> Result<OpOutput<V>, Error> + Send>),

    /// Chaining: consumes the previous op's result from the same cycle's
    /// expansion chain (`None` for the first op in a chain). The previous
    /// result is passed by reference so a failed attempt can be retried
    /// against the same input.
    Chaining(Box<dyn FnMut(Option<&V>) -> Result<OpOutput<V>, Error> + Send>),
}

impl<V> std::fmt::Debug for OpKind<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Runnable(_) => f.write_str("OpKind::Runnable"),
            OpKind::Cycle(_) => f.write_str("OpKind::Cycle"),
            OpKind::Chaining(_) => f.write_str("OpKind::Chaining"),
        }
    }
}

/// Expansion hook: invoked once after an op's attempt loop concludes,
/// optionally yielding a follow-on op for the same cycle.
pub type ExpandFn<V> = Box<dyn FnOnce() -> Option<Op<V>> + Send>;

/// One unit of executable work, bound to a single cycle.
pub struct Op<V> {
    pub kind: OpKind<V>,
    pub expand: Option<ExpandFn<V>>,
}

impl<V> Op<V> {
    /// Fire-and-forget op
    pub fn runnable(f: impl FnMut() -> Result<(), Error> + Send + 'static) -> Self {
        Self {
            kind: OpKind::Runnable(Box::new(f)),
            expand: None,
        }
    }

    /// Value-producing op
    pub fn value(f: impl FnMut(u64) -> Result<OpOutput<V>, Error> + Send + 'static) -> Self {
        Self {
            kind: OpKind::Cycle(Box::new(f)),
            expand: None,
        }
    }

    /// Chaining op consuming the previous result in the expansion chain
    pub fn chaining(
        f: impl FnMut(Option<&V>) -> Result<OpOutput<V>, Error> + Send + 'static,
    ) -> Self {
        Self {
            kind: OpKind::Chaining(Box::new(f)),
            expand: None,
        }
    }

    /// Attach an expansion step yielding the next op in this cycle's chain
    pub fn with_expansion(mut self, f: impl FnOnce() -> Option<Op<V>> + Send + 'static) -> Self {
        self.expand = Some(Box::new(f));
        self
    }
}

impl<V> std::fmt::Debug for Op<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Op")
            .field("kind", &self.kind)
            .field("expanding", &self.expand.is_some())
            .finish()
    }
}

/// Factory turning a cycle number into an executable op.
///
/// Dispensers are created once per activity, hold any shared backend context
/// (connection pools, prepared statements) behind their own `Arc`, and must
/// be safe to call from every worker concurrently. The lifecycle hooks are
/// invoked by the engine around each attempt for adapter-owned bookkeeping;
/// the defaults do nothing.
pub trait OpDispenser<V>: Send + Sync {
    /// Materialize the op for `cycle`. Must be a pure function of the cycle
    /// number and the dispenser's static configuration.
    fn materialize(&self, cycle: u64) -> Result<Op<V>, Error>;

    /// A stable name for logs and bind-fault context
    fn name(&self) -> &str {
        "op"
    }

    fn on_start(&self, _cycle: u64) {}

    fn on_success(&self, _cycle: u64, _elapsed_nanos: u64, _result_size: u64) {}

    fn on_error(&self, _cycle: u64, _elapsed_nanos: u64, _fault: &Error) {}
}
