//! Per-reader metrics handle.
//!
//! Owned by the merged handle for its whole lifetime and shared with the
//! engine task. Gauges are unregistered from the sink exactly once, when
//! the handle is closed or dropped.
//!
//! The reader's own member count lives here. The sink's `num_read_handles`
//! gauge only receives this reader's changes, so readers that share an
//! unscoped sink report their sum there without disturbing each other.

use std::sync::{Arc, Mutex};

use tracing::debug;

use grabby_member::ReadMessage;
use grabby_metrics::{Gauge, MetricsSink};

use crate::outstanding::{OutstandingTracker, OUTSTANDING_READS};

pub const NUM_READ_HANDLES: &str = "num_read_handles";

#[derive(Default)]
struct Members {
    count: i64,
    released: bool,
}

pub(crate) struct ReaderMetrics {
    sink: Arc<dyn MetricsSink>,
    num_read_handles: Gauge,
    outstanding: Option<OutstandingTracker>,
    members: Mutex<Members>,
}

impl ReaderMetrics {
    pub(crate) fn new(sink: Arc<dyn MetricsSink>, track_outstanding: bool) -> Self {
        let num_read_handles = sink.gauge(NUM_READ_HANDLES);
        let outstanding = track_outstanding.then(|| OutstandingTracker::new(sink.as_ref()));
        Self {
            sink,
            num_read_handles,
            outstanding,
            members: Mutex::new(Members::default()),
        }
    }

    /// Record the live member count. Ignored once released.
    pub(crate) fn set_members(&self, count: usize) {
        let mut members = self.members.lock().expect("reader metrics lock");
        if members.released {
            return;
        }
        let count = count as i64;
        self.num_read_handles.add(count - members.count);
        members.count = count;
    }

    pub(crate) fn members(&self) -> i64 {
        self.members.lock().expect("reader metrics lock").count
    }

    /// Pass-through unless outstanding tracking is enabled.
    pub(crate) fn track(&self, msg: ReadMessage) -> ReadMessage {
        match &self.outstanding {
            Some(tracker) => tracker.track(msg),
            None => msg,
        }
    }

    pub(crate) fn outstanding(&self) -> Option<&OutstandingTracker> {
        self.outstanding.as_ref()
    }

    /// Unregister this reader's gauges. Later calls do nothing.
    pub(crate) fn release(&self) {
        let mut members = self.members.lock().expect("reader metrics lock");
        if members.released {
            return;
        }
        members.released = true;
        self.num_read_handles.add(-members.count);
        drop(members);

        self.sink.remove_gauge(NUM_READ_HANDLES);
        if self.outstanding.is_some() {
            self.sink.remove_gauge(OUTSTANDING_READS);
        }
        debug!("reader gauges unregistered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grabby_metrics::MetricsRegistry;

    #[test]
    fn untracked_reader_only_registers_member_gauge() {
        let registry = MetricsRegistry::new();
        let metrics = ReaderMetrics::new(Arc::new(registry.clone()), false);
        metrics.set_members(2);

        assert_eq!(registry.gauge_value(NUM_READ_HANDLES), Some(2));
        assert_eq!(registry.gauge_value(OUTSTANDING_READS), None);
        assert!(metrics.outstanding().is_none());

        let msg = metrics.track(ReadMessage::detached("m"));
        msg.ack();
        assert_eq!(registry.counter_value("messages.received"), None);
    }

    #[test]
    fn release_unregisters_gauges_once() {
        let registry = MetricsRegistry::new();
        let metrics = ReaderMetrics::new(Arc::new(registry.clone()), true);
        assert!(registry.gauge_value(OUTSTANDING_READS).is_some());

        metrics.release();
        assert_eq!(registry.gauge_value(NUM_READ_HANDLES), None);
        assert_eq!(registry.gauge_value(OUTSTANDING_READS), None);

        // A second reader registering the same names is not disturbed.
        let _other = registry.gauge(NUM_READ_HANDLES);
        metrics.release();
        assert!(registry.gauge_value(NUM_READ_HANDLES).is_some());
    }

    #[test]
    fn readers_on_one_sink_keep_their_own_counts() {
        let registry = MetricsRegistry::new();
        let first = ReaderMetrics::new(Arc::new(registry.clone()), false);
        let second = ReaderMetrics::new(Arc::new(registry.clone()), false);
        first.set_members(2);
        second.set_members(1);

        assert_eq!(first.members(), 2);
        assert_eq!(second.members(), 1);
        assert_eq!(registry.gauge_value(NUM_READ_HANDLES), Some(3));

        first.set_members(0);
        first.release();
        assert_eq!(second.members(), 1);
        assert_eq!(registry.gauge_value(NUM_READ_HANDLES), Some(1));

        // Updates after release no longer reach the sink.
        first.set_members(5);
        assert_eq!(registry.gauge_value(NUM_READ_HANDLES), Some(1));
    }
}
