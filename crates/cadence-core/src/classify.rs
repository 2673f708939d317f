//! Fault classification: converts backend faults into structured outcomes.
//!
//! Execution faults are opaque `anyhow::Error` values raised by ops. A
//! [`HandlerChain`] holds an ordered list of named handlers; the first
//! handler that recognizes a fault produces the [`ErrorDetail`] for it.
//! Unrecognized faults fall through to a default non-retryable detail and
//! are logged with full context, so no fault is ever silently dropped.

use anyhow::Error;
use tracing::{debug, error, warn};

/// Result code assigned to faults no handler recognized
pub const DEFAULT_ERROR_CODE: i32 = 1;

/// How loudly a classified fault should be reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warn,
    Error,
    Fatal,
}

/// The structured outcome of classifying one failed attempt.
///
/// Produced fresh per failed attempt and never persisted beyond the current
/// cycle's processing. The `code` is the caller-visible contract used for
/// exit status and accounting.
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    pub code: i32,
    pub retryable: bool,
    pub severity: Severity,
    pub cycle: u64,
    pub elapsed_nanos: u64,
    pub message: String,
}

/// One named link in the classification chain.
///
/// Handlers are pure with respect to the fault but may log or count.
pub trait FaultHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Return `Some` if this handler recognizes the fault, `None` to let the
    /// next handler in the chain look at it.
    fn classify(&self, fault: &Error, cycle: u64, elapsed_nanos: u64) -> Option<ErrorDetail>;
}

/// Ordered chain of fault handlers; first match wins.
#[derive(Default)]
pub struct HandlerChain {
    handlers: Vec<Box<dyn FaultHandler>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler (builder style)
    pub fn with(mut self, handler: impl FaultHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn push(&mut self, handler: impl FaultHandler + 'static) {
        self.handlers.push(Box::new(handler));
    }

    /// Classify a fault raised during `cycle` after `elapsed_nanos`.
    ///
    /// Falls through to a non-retryable [`DEFAULT_ERROR_CODE`] detail when no
    /// handler matches.
    pub fn classify(&self, fault: &Error, cycle: u64, elapsed_nanos: u64) -> ErrorDetail {
        for handler in &self.handlers {
            if let Some(detail) = handler.classify(fault, cycle, elapsed_nanos) {
                match detail.severity {
                    Severity::Warn => debug!(
                        handler = handler.name(),
                        cycle,
                        code = detail.code,
                        retryable = detail.retryable,
                        "classified fault: {fault}"
                    ),
                    Severity::Error | Severity::Fatal => warn!(
                        handler = handler.name(),
                        cycle,
                        code = detail.code,
                        retryable = detail.retryable,
                        "classified fault: {fault}"
                    ),
                }
                return detail;
            }
        }

        error!(
            cycle,
            elapsed_nanos, "unclassified fault, treating as non-retryable: {fault:#}"
        );
        ErrorDetail {
            code: DEFAULT_ERROR_CODE,
            retryable: false,
            severity: Severity::Error,
            cycle,
            elapsed_nanos,
            message: fault.to_string(),
        }
    }
}

impl std::fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.handlers.iter().map(|h| h.name()).collect();
        f.debug_struct("HandlerChain").field("handlers", &names).finish()
    }
}

/// Predicate-based handler covering the common cases.
///
/// Matches either on a concrete fault type (via [`MatchHandler::for_type`])
/// or on an arbitrary predicate over the fault.
pub struct MatchHandler {
    name: String,
    code: i32,
    retryable: bool,
    severity: Severity,
    predicate: Box<dyn Fn(&Error) -> bool + Send + Sync>,
}

impl MatchHandler {
    pub fn new(
        name: impl Into<String>,
        code: i32,
        retryable: bool,
        predicate: impl Fn(&Error) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            code,
            retryable,
            severity: if retryable {
                Severity::Warn
            } else {
                Severity::Error
            },
            predicate: Box::new(predicate),
        }
    }

    /// Match faults that downcast to the concrete error type `E`
    pub fn for_type<E>(name: impl Into<String>, code: i32, retryable: bool) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::new(name, code, retryable, |fault| {
            fault.downcast_ref::<E>().is_some()
        })
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

impl FaultHandler for MatchHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify(&self, fault: &Error, cycle: u64, elapsed_nanos: u64) -> Option<ErrorDetail> {
        if !(self.predicate)(fault) {
            return None;
        }
        Some(ErrorDetail {
            code: self.code,
            retryable: self.retryable,
            severity: self.severity,
            cycle,
            elapsed_nanos,
            message: fault.to_string(),
        })
    }
}
