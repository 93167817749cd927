//! grabby-metrics — counters and gauges for grabby readers.
//!
//! Readers never touch a process-wide registry. They are handed a
//! [`MetricsSink`] at construction and obtain their counters and gauges
//! from it; the sink decides where the values end up.
//!
//! # Architecture
//!
//! ```text
//! MetricsSink (trait)
//!   ├── MetricsRegistry → in-memory values, snapshot(), render_prometheus()
//!   ├── Scoped          → prefixes every name with "<scope>/"
//!   └── NoopSink        → detached values nobody reads
//! ```

pub mod prometheus;
pub mod registry;

pub use prometheus::render_prometheus;
pub use registry::{
    Counter, Gauge, MetricKind, MetricSample, MetricsRegistry, MetricsSink, NoopSink, Scoped,
};
