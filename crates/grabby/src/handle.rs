//! The application-facing merged read handle.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::debug;

use grabby_member::ReadMessage;

use crate::engine::raised;
use crate::error::ReadError;
use crate::metrics::ReaderMetrics;
use crate::outstanding::OutstandingTracker;

/// One logical read stream over every live member of the queue.
///
/// Dropping the handle closes it without waiting.
pub struct MergedHandle {
    queue: String,
    messages: mpsc::Receiver<ReadMessage>,
    errors: mpsc::Receiver<ReadError>,
    shutdown: watch::Sender<bool>,
    done: watch::Receiver<bool>,
    metrics: Arc<ReaderMetrics>,
}

impl MergedHandle {
    pub(crate) fn new(
        queue: String,
        messages: mpsc::Receiver<ReadMessage>,
        errors: mpsc::Receiver<ReadError>,
        shutdown: watch::Sender<bool>,
        done: watch::Receiver<bool>,
        metrics: Arc<ReaderMetrics>,
    ) -> Self {
        Self {
            queue,
            messages,
            errors,
            shutdown,
            done,
            metrics,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Next message from any member.
    ///
    /// Returns `None` once the reader has been closed, or once it has run
    /// out of members and every message already handed over has been
    /// received.
    pub async fn recv(&mut self) -> Option<ReadMessage> {
        self.messages.recv().await
    }

    /// Next signal on the error channel.
    ///
    /// Yields any discovery failures, then exactly one terminal signal
    /// (`ReadClosed` or `AllHandlesDied`), then `None`.
    pub async fn next_error(&mut self) -> Option<ReadError> {
        self.errors.recv().await
    }

    /// Close every member and end the stream. Idempotent.
    ///
    /// When this returns, every member that was live at the time has been
    /// asked to close. Messages forwarded but not yet received are aborted
    /// and `recv()` returns `None`.
    pub async fn close(&mut self) {
        self.shutdown.send_replace(true);
        let mut done = self.done.clone();
        raised(&mut done).await;
        self.discard_buffered();
        self.metrics.release();
    }

    /// Whether the reader has delivered its terminal signal.
    pub fn is_terminated(&self) -> bool {
        *self.done.borrow()
    }

    /// Number of live members held by this reader.
    pub fn num_members(&self) -> i64 {
        self.metrics.members()
    }

    /// Outstanding request counters, when tracking is enabled.
    pub fn outstanding(&self) -> Option<&OutstandingTracker> {
        self.metrics.outstanding()
    }

    /// Stop accepting messages and abort the ones still buffered.
    fn discard_buffered(&mut self) {
        self.messages.close();
        let mut aborted = 0usize;
        while let Ok(msg) = self.messages.try_recv() {
            msg.abort();
            aborted += 1;
        }
        if aborted > 0 {
            debug!(queue = %self.queue, aborted, "aborted unread messages on close");
        }
    }
}

impl Drop for MergedHandle {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        self.discard_buffered();
        self.metrics.release();
    }
}
