//! Metric handles and the sinks that hand them out.
//!
//! Counter and gauge handles are cheap `Arc`-backed atomics. Writers
//! update them once per event; any number of readers can load them
//! concurrently.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::debug;

/// Monotonic counter.
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicU64>);

impl Counter {
    pub fn incr(&self) {
        self.add(1);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Point-in-time value that can move both ways.
#[derive(Debug, Clone, Default)]
pub struct Gauge(Arc<AtomicI64>);

impl Gauge {
    pub fn set(&self, value: i64) {
        self.0.store(value, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn add(&self, delta: i64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Destination for a reader's counters and gauges.
///
/// Asking twice for the same name returns handles to the same value, so
/// readers sharing a sink without distinct scopes add into one set of
/// metrics.
pub trait MetricsSink: Send + Sync {
    fn counter(&self, name: &str) -> Counter;

    fn gauge(&self, name: &str) -> Gauge;

    /// Give back one registration obtained through [`gauge`](Self::gauge).
    ///
    /// The gauge stops being reported once every holder has given it back.
    /// Existing handles keep working either way.
    fn remove_gauge(&self, name: &str);
}

/// Sink that hands out detached handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn counter(&self, _name: &str) -> Counter {
        Counter::default()
    }

    fn gauge(&self, _name: &str) -> Gauge {
        Gauge::default()
    }

    fn remove_gauge(&self, _name: &str) {}
}

/// Prefixes every metric name with `"{scope}/"` before delegating.
pub struct Scoped {
    inner: Arc<dyn MetricsSink>,
    scope: String,
}

impl Scoped {
    pub fn new(inner: Arc<dyn MetricsSink>, scope: &str) -> Self {
        Self {
            inner,
            scope: scope.trim_end_matches('/').to_string(),
        }
    }

    fn name(&self, name: &str) -> String {
        format!("{}/{}", self.scope, name)
    }
}

impl MetricsSink for Scoped {
    fn counter(&self, name: &str) -> Counter {
        self.inner.counter(&self.name(name))
    }

    fn gauge(&self, name: &str) -> Gauge {
        self.inner.gauge(&self.name(name))
    }

    fn remove_gauge(&self, name: &str) {
        self.inner.remove_gauge(&self.name(name))
    }
}

/// Kind of a reported metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

/// One metric value at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub name: String,
    pub kind: MetricKind,
    pub value: i64,
}

/// A registered gauge and how many holders asked for it.
#[derive(Default)]
struct GaugeEntry {
    gauge: Gauge,
    holders: usize,
}

/// In-memory sink that keeps every registered metric by name.
///
/// Cloning shares the underlying maps.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    counters: Arc<RwLock<BTreeMap<String, Counter>>>,
    gauges: Arc<RwLock<BTreeMap<String, GaugeEntry>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter, if registered.
    pub fn counter_value(&self, name: &str) -> Option<u64> {
        let counters = self.counters.read().expect("counters lock");
        counters.get(name).map(Counter::get)
    }

    /// Current value of a gauge, if registered.
    pub fn gauge_value(&self, name: &str) -> Option<i64> {
        let gauges = self.gauges.read().expect("gauges lock");
        gauges.get(name).map(|entry| entry.gauge.get())
    }

    /// All metrics, counters first, each group sorted by name.
    pub fn snapshot(&self) -> Vec<MetricSample> {
        let counters = self.counters.read().expect("counters lock");
        let gauges = self.gauges.read().expect("gauges lock");

        let counters = counters.iter().map(|(name, c)| MetricSample {
            name: name.clone(),
            kind: MetricKind::Counter,
            value: c.get() as i64,
        });
        let gauges = gauges.iter().map(|(name, entry)| MetricSample {
            name: name.clone(),
            kind: MetricKind::Gauge,
            value: entry.gauge.get(),
        });
        counters.chain(gauges).collect()
    }
}

impl MetricsSink for MetricsRegistry {
    fn counter(&self, name: &str) -> Counter {
        let mut counters = self.counters.write().expect("counters lock");
        counters.entry(name.to_string()).or_default().clone()
    }

    fn gauge(&self, name: &str) -> Gauge {
        let mut gauges = self.gauges.write().expect("gauges lock");
        let entry = gauges.entry(name.to_string()).or_insert_with(|| {
            debug!(gauge = name, "registered gauge");
            GaugeEntry::default()
        });
        entry.holders += 1;
        entry.gauge.clone()
    }

    fn remove_gauge(&self, name: &str) {
        let mut gauges = self.gauges.write().expect("gauges lock");
        let Some(entry) = gauges.get_mut(name) else {
            return;
        };
        entry.holders = entry.holders.saturating_sub(1);
        if entry.holders == 0 {
            gauges.remove(name);
            debug!(gauge = name, "unregistered gauge");
        }
    }
}
