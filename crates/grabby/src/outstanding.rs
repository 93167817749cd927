//! Outstanding request tracking.
//!
//! Wraps each forwarded message so that acking or aborting it updates
//! the reader's counters. Delivery itself is untouched: the wrapper only
//! composes side effects around the existing continuations.

use grabby_member::ReadMessage;
use grabby_metrics::{Counter, Gauge, MetricsSink};

pub const MESSAGES_RECEIVED: &str = "messages.received";
pub const MESSAGES_ACK: &str = "messages.ack";
pub const MESSAGES_ABORT: &str = "messages.abort";
pub const OUTSTANDING_READS: &str = "outstanding_reads";

/// Counts messages between forward and ack/abort.
///
/// `outstanding = received - acked - aborted` at all times. Because
/// [`ReadMessage::ack`] and [`ReadMessage::abort`] consume the message,
/// each forwarded message decrements `outstanding` at most once and the
/// gauge never goes negative.
#[derive(Debug, Clone)]
pub struct OutstandingTracker {
    received: Counter,
    acked: Counter,
    aborted: Counter,
    outstanding: Gauge,
}

impl OutstandingTracker {
    pub fn new(sink: &dyn MetricsSink) -> Self {
        Self {
            received: sink.counter(MESSAGES_RECEIVED),
            acked: sink.counter(MESSAGES_ACK),
            aborted: sink.counter(MESSAGES_ABORT),
            outstanding: sink.gauge(OUTSTANDING_READS),
        }
    }

    /// Count a forwarded message and wrap its continuations.
    pub fn track(&self, msg: ReadMessage) -> ReadMessage {
        self.received.incr();
        self.outstanding.inc();

        let (acked, on_ack_outstanding) = (self.acked.clone(), self.outstanding.clone());
        let (aborted, on_abort_outstanding) = (self.aborted.clone(), self.outstanding.clone());
        msg.observe(
            move || {
                acked.incr();
                on_ack_outstanding.dec();
            },
            move || {
                aborted.incr();
                on_abort_outstanding.dec();
            },
        )
    }

    pub fn received(&self) -> u64 {
        self.received.get()
    }

    pub fn acked(&self) -> u64 {
        self.acked.get()
    }

    pub fn aborted(&self) -> u64 {
        self.aborted.get()
    }

    pub fn outstanding(&self) -> i64 {
        self.outstanding.get()
    }
}
