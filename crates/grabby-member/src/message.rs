//! A single message read from a member.

use std::fmt;

use bytes::Bytes;

type Continuation = Box<dyn FnOnce() + Send + 'static>;

/// A message handed out by a member's read stream.
///
/// The consumer is expected to eventually either [`ack`](Self::ack) the
/// message (it was processed) or [`abort`](Self::abort) it (hand it back
/// to the queue). Both consume the message, so at most one of the two
/// continuations ever runs. Dropping a message runs neither.
pub struct ReadMessage {
    bytes: Bytes,
    on_ack: Continuation,
    on_abort: Continuation,
}

impl ReadMessage {
    pub fn new(
        bytes: impl Into<Bytes>,
        on_ack: impl FnOnce() + Send + 'static,
        on_abort: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            on_ack: Box::new(on_ack),
            on_abort: Box::new(on_abort),
        }
    }

    /// A message whose continuations do nothing.
    pub fn detached(bytes: impl Into<Bytes>) -> Self {
        Self::new(bytes, || {}, || {})
    }

    /// Message payload.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Confirm the message was processed.
    pub fn ack(self) {
        (self.on_ack)()
    }

    /// Return the message to the queue.
    pub fn abort(self) {
        (self.on_abort)()
    }

    /// Compose extra side effects after the existing continuations.
    ///
    /// The payload is untouched and nothing runs until the consumer acks
    /// or aborts.
    pub fn observe(
        self,
        after_ack: impl FnOnce() + Send + 'static,
        after_abort: impl FnOnce() + Send + 'static,
    ) -> Self {
        let Self {
            bytes,
            on_ack,
            on_abort,
        } = self;
        Self {
            bytes,
            on_ack: Box::new(move || {
                on_ack();
                after_ack();
            }),
            on_abort: Box::new(move || {
                on_abort();
                after_abort();
            }),
        }
    }
}

impl fmt::Debug for ReadMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadMessage")
            .field("bytes", &self.bytes)
            .finish_non_exhaustive()
    }
}
