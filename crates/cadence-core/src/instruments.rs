//! Instrumentation sink: named timers and histograms shared across workers.
//!
//! Every worker updates these on every attempt, so each metric carries its
//! own lock rather than one lock guarding the whole set. Histograms are HDR
//! histograms (1ns to 60s, 3 significant figures), matching the precision we
//! want for latency percentile reporting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Result sizes above this go to the large-latency / large-stretch metrics
pub const SIZE_THRESHOLD: u64 = 10_000;

const HIST_MAX: u64 = 60_000_000_000; // 60s in nanos
const HIST_SIGFIGS: u8 = 3;

/// Canonical metric names used by the action loop
pub mod names {
    pub const BIND: &str = "bind";
    pub const EXECUTE: &str = "execute";
    pub const RESULT: &str = "result";
    pub const RESULT_SUCCESS: &str = "result-success";
    pub const SMALL_LATENCY: &str = "small-latency";
    pub const LARGE_LATENCY: &str = "large-latency";
    pub const TRIES: &str = "tries";
    pub const STRETCH: &str = "stretch";
    pub const SMALL_STRETCH: &str = "small-stretch";
    pub const LARGE_STRETCH: &str = "large-stretch";
}

/// A general-purpose value histogram (tries, stretch)
pub struct CycleHistogram {
    name: String,
    hist: RwLock<Histogram<u64>>,
}

impl CycleHistogram {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hist: RwLock::new(
                Histogram::new_with_bounds(1, HIST_MAX, HIST_SIGFIGS)
                    .expect("histogram bounds are static and valid"),
            ),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record(&self, value: u64) {
        if let Err(e) = self.hist.write().record(value) {
            warn!(metric = %self.name, value, "failed to record histogram value: {e}");
        }
    }

    /// Number of recorded values
    pub fn count(&self) -> u64 {
        self.hist.read().len()
    }

    pub fn max(&self) -> u64 {
        self.hist.read().max()
    }

    pub fn value_at_quantile(&self, quantile: f64) -> u64 {
        self.hist.read().value_at_quantile(quantile)
    }

    pub fn summary(&self) -> MetricSummary {
        let hist = self.hist.read();
        MetricSummary {
            name: self.name.clone(),
            count: hist.len(),
            p50: hist.value_at_quantile(0.50),
            p90: hist.value_at_quantile(0.90),
            p99: hist.value_at_quantile(0.99),
            max: hist.max(),
            mean: hist.mean() as u64,
        }
    }
}

/// A latency timer recording elapsed nanoseconds
pub struct Timer {
    inner: CycleHistogram,
}

impl Timer {
    fn new(name: &str) -> Self {
        Self {
            inner: CycleHistogram::new(name),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn update(&self, elapsed: Duration) {
        self.update_nanos(elapsed.as_nanos() as u64);
    }

    pub fn update_nanos(&self, nanos: u64) {
        self.inner.record(nanos);
    }

    /// Number of recorded updates
    pub fn count(&self) -> u64 {
        self.inner.count()
    }

    pub fn max_nanos(&self) -> u64 {
        self.inner.max()
    }

    pub fn summary(&self) -> MetricSummary {
        self.inner.summary()
    }
}

/// Process-wide registry scoped to one activity.
///
/// `timer` and `histogram` are idempotent get-or-create: repeated calls with
/// the same name return the same underlying counter.
#[derive(Default)]
pub struct MetricsRegistry {
    timers: RwLock<HashMap<String, Arc<Timer>>>,
    histograms: RwLock<HashMap<String, Arc<CycleHistogram>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timer(&self, name: &str) -> Arc<Timer> {
        if let Some(timer) = self.timers.read().get(name) {
            return Arc::clone(timer);
        }
        let mut timers = self.timers.write();
        Arc::clone(
            timers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Timer::new(name))),
        )
    }

    pub fn histogram(&self, name: &str) -> Arc<CycleHistogram> {
        if let Some(hist) = self.histograms.read().get(name) {
            return Arc::clone(hist);
        }
        let mut histograms = self.histograms.write();
        Arc::clone(
            histograms
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(CycleHistogram::new(name))),
        )
    }

    /// Snapshot every registered metric for reporting
    pub fn summary(&self) -> InstrumentsSummary {
        let mut timers: Vec<MetricSummary> =
            self.timers.read().values().map(|t| t.summary()).collect();
        let mut histograms: Vec<MetricSummary> = self
            .histograms
            .read()
            .values()
            .map(|h| h.summary())
            .collect();
        timers.sort_by(|a, b| a.name.cmp(&b.name));
        histograms.sort_by(|a, b| a.name.cmp(&b.name));
        InstrumentsSummary { timers, histograms }
    }
}

/// The fixed metric set the action loop updates, resolved once per activity
/// so the hot loop never touches the registry maps.
#[derive(Clone)]
pub struct ActivityInstruments {
    pub bind_timer: Arc<Timer>,
    pub execute_timer: Arc<Timer>,
    pub result_timer: Arc<Timer>,
    pub result_success_timer: Arc<Timer>,
    pub small_latency_timer: Arc<Timer>,
    pub large_latency_timer: Arc<Timer>,
    pub tries_histogram: Arc<CycleHistogram>,
    pub stretch_histogram: Arc<CycleHistogram>,
    pub small_stretch_histogram: Arc<CycleHistogram>,
    pub large_stretch_histogram: Arc<CycleHistogram>,
}

impl ActivityInstruments {
    pub fn register(registry: &MetricsRegistry) -> Self {
        Self {
            bind_timer: registry.timer(names::BIND),
            execute_timer: registry.timer(names::EXECUTE),
            result_timer: registry.timer(names::RESULT),
            result_success_timer: registry.timer(names::RESULT_SUCCESS),
            small_latency_timer: registry.timer(names::SMALL_LATENCY),
            large_latency_timer: registry.timer(names::LARGE_LATENCY),
            tries_histogram: registry.histogram(names::TRIES),
            stretch_histogram: registry.histogram(names::STRETCH),
            small_stretch_histogram: registry.histogram(names::SMALL_STRETCH),
            large_stretch_histogram: registry.histogram(names::LARGE_STRETCH),
        }
    }
}

/// Point-in-time snapshot of one metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSummary {
    pub name: String,
    pub count: u64,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub max: u64,
    pub mean: u64,
}

/// Snapshot of every metric in a registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentsSummary {
    pub timers: Vec<MetricSummary>,
    pub histograms: Vec<MetricSummary>,
}

impl InstrumentsSummary {
    /// Print a formatted report to stdout
    pub fn print_report(&self) {
        println!("\n═══════════════════════════════════════════════════════════════════════");
        println!("                         INSTRUMENT SUMMARY");
        println!("═══════════════════════════════════════════════════════════════════════");
        println!(
            "{:<16} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "timer (ns)", "count", "p50", "p99", "max", "mean"
        );
        println!("───────────────────────────────────────────────────────────────────────");
        for t in &self.timers {
            println!(
                "{:<16} {:>10} {:>10} {:>10} {:>10} {:>10}",
                t.name, t.count, t.p50, t.p99, t.max, t.mean
            );
        }
        println!("───────────────────────────────────────────────────────────────────────");
        println!(
            "{:<16} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "histogram", "count", "p50", "p99", "max", "mean"
        );
        println!("───────────────────────────────────────────────────────────────────────");
        for h in &self.histograms {
            println!(
                "{:<16} {:>10} {:>10} {:>10} {:>10} {:>10}",
                h.name, h.count, h.p50, h.p99, h.max, h.mean
            );
        }
        println!("═══════════════════════════════════════════════════════════════════════\n");
    }
}
