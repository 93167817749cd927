//! In-process member handles.
//!
//! `MemoryMember` holds both ends of a member: tests and the simulator
//! push messages and inject failures on one side, the reader consumes
//! them through [`MemberHandle`] on the other.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{ConnectionError, MemberError};
use crate::handle::{MemberFactory, MemberHandle, RetryPolicy, SharedMember};
use crate::message::ReadMessage;

/// Delivery counters for one in-memory member.
#[derive(Debug, Default)]
struct MemberStats {
    delivered: AtomicU64,
    acked: AtomicU64,
    aborted: AtomicU64,
}

/// A member backed by in-process channels.
pub struct MemoryMember {
    address: String,
    queue: String,
    tx: Mutex<Option<mpsc::UnboundedSender<ReadMessage>>>,
    rx: Mutex<mpsc::UnboundedReceiver<ReadMessage>>,
    fail_tx: Mutex<Option<oneshot::Sender<MemberError>>>,
    fail_rx: Mutex<Option<oneshot::Receiver<MemberError>>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    stats: Arc<MemberStats>,
}

impl MemoryMember {
    pub fn new(address: &str, queue: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (fail_tx, fail_rx) = oneshot::channel();
        Self {
            address: address.to_string(),
            queue: queue.to_string(),
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
            fail_tx: Mutex::new(Some(fail_tx)),
            fail_rx: Mutex::new(Some(fail_rx)),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            stats: Arc::new(MemberStats::default()),
        }
    }

    /// Queue this member was opened for.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Enqueue a message. Returns `false` once the member is closed or
    /// finished.
    pub fn push(&self, payload: impl Into<Bytes>) -> bool {
        let ack_stats = self.stats.clone();
        let abort_stats = self.stats.clone();
        let msg = ReadMessage::new(
            payload,
            move || {
                ack_stats.acked.fetch_add(1, Ordering::Relaxed);
            },
            move || {
                abort_stats.aborted.fetch_add(1, Ordering::Relaxed);
            },
        );

        let tx = self.tx.lock().expect("member tx lock");
        match tx.as_ref() {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }

    /// Fire the error source. Only the first call has an effect.
    pub fn fail(&self, reason: &str) {
        if let Some(tx) = self.fail_tx.lock().expect("member fail lock").take() {
            let _ = tx.send(MemberError::Disconnected {
                address: self.address.clone(),
                reason: reason.to_string(),
            });
        }
    }

    /// End the message source once queued messages are drained.
    pub fn finish(&self) {
        self.tx.lock().expect("member tx lock").take();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// How many times `close()` was invoked.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Messages handed to the reader so far.
    pub fn delivered(&self) -> u64 {
        self.stats.delivered.load(Ordering::Relaxed)
    }

    pub fn acked(&self) -> u64 {
        self.stats.acked.load(Ordering::Relaxed)
    }

    pub fn aborted(&self) -> u64 {
        self.stats.aborted.load(Ordering::Relaxed)
    }
}

impl MemberHandle for MemoryMember {
    fn address(&self) -> &str {
        &self.address
    }

    fn poll_message(&self, cx: &mut Context<'_>) -> Poll<Option<ReadMessage>> {
        if self.is_closed() {
            return Poll::Ready(None);
        }
        let mut rx = self.rx.lock().expect("member rx lock");
        let polled = rx.poll_recv(cx);
        if let Poll::Ready(Some(_)) = &polled {
            self.stats.delivered.fetch_add(1, Ordering::Relaxed);
        }
        polled
    }

    fn poll_error(&self, cx: &mut Context<'_>) -> Poll<MemberError> {
        let mut slot = self.fail_rx.lock().expect("member fail lock");
        let Some(rx) = slot.as_mut() else {
            return Poll::Pending;
        };
        match Pin::new(rx).poll(cx) {
            Poll::Ready(Ok(err)) => {
                slot.take();
                Poll::Ready(err)
            }
            // The sender is gone without firing: no error will ever arrive.
            Poll::Ready(Err(_)) => {
                slot.take();
                Poll::Pending
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.rx.lock().expect("member rx lock").close();
            debug!(address = %self.address, queue = %self.queue, "memory member closed");
        }
    }
}

/// Factory that opens [`MemoryMember`]s and remembers them by address.
#[derive(Default)]
pub struct MemoryFactory {
    members: Mutex<HashMap<String, Arc<MemoryMember>>>,
    refused: Mutex<HashSet<String>>,
    preload: usize,
    finite: bool,
    created: AtomicUsize,
    last_retry: Mutex<Option<RetryPolicy>>,
}

impl MemoryFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed every new member with `count` messages (`"{address}/{i}"`).
    pub fn with_preload(mut self, count: usize) -> Self {
        self.preload = count;
        self
    }

    /// End every new member's stream once its preload is drained.
    pub fn finite(mut self) -> Self {
        self.finite = true;
        self
    }

    /// Make `create` fail for an address until [`accept`](Self::accept).
    pub fn refuse(&self, address: &str) {
        self.refused
            .lock()
            .expect("factory lock")
            .insert(address.to_string());
    }

    pub fn accept(&self, address: &str) {
        self.refused.lock().expect("factory lock").remove(address);
    }

    /// Most recently created member for an address.
    pub fn member(&self, address: &str) -> Option<Arc<MemoryMember>> {
        self.members
            .lock()
            .expect("factory lock")
            .get(address)
            .cloned()
    }

    /// Retry policy passed to the most recent `create` call.
    pub fn last_retry(&self) -> Option<RetryPolicy> {
        self.last_retry.lock().expect("factory lock").clone()
    }

    /// Total number of handles created.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl MemberFactory for MemoryFactory {
    fn create(
        &self,
        address: &str,
        queue: &str,
        retry: Option<&RetryPolicy>,
    ) -> Result<SharedMember, ConnectionError> {
        *self.last_retry.lock().expect("factory lock") = retry.cloned();
        if self.refused.lock().expect("factory lock").contains(address) {
            return Err(ConnectionError::new(address, queue, "connection refused"));
        }

        let member = Arc::new(MemoryMember::new(address, queue));
        for i in 0..self.preload {
            member.push(format!("{address}/{i}"));
        }
        if self.finite {
            member.finish();
        }

        self.members
            .lock()
            .expect("factory lock")
            .insert(address.to_string(), member.clone());
        self.created.fetch_add(1, Ordering::SeqCst);
        debug!(%address, %queue, "memory member created");
        Ok(member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::poll_fn;

    #[tokio::test]
    async fn messages_arrive_in_order() {
        let member = MemoryMember::new("a", "q");
        member.push("1");
        member.push("2");

        let first = poll_fn(|cx| member.poll_message(cx)).await.unwrap();
        let second = poll_fn(|cx| member.poll_message(cx)).await.unwrap();
        assert_eq!(first.bytes().as_ref(), b"1");
        assert_eq!(second.bytes().as_ref(), b"2");
        assert_eq!(member.delivered(), 2);
    }

    #[tokio::test]
    async fn ack_and_abort_are_counted() {
        let member = MemoryMember::new("a", "q");
        member.push("1");
        member.push("2");

        poll_fn(|cx| member.poll_message(cx)).await.unwrap().ack();
        poll_fn(|cx| member.poll_message(cx)).await.unwrap().abort();
        assert_eq!(member.acked(), 1);
        assert_eq!(member.aborted(), 1);
    }

    #[tokio::test]
    async fn error_fires_once() {
        let member = MemoryMember::new("a", "q");
        member.fail("boom");
        member.fail("again");

        let err = poll_fn(|cx| member.poll_error(cx)).await;
        assert_eq!(err.address(), "a");

        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        assert!(member.poll_error(&mut cx).is_pending());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_stops_delivery() {
        let member = MemoryMember::new("a", "q");
        member.push("queued");
        member.close();
        member.close();

        assert!(member.is_closed());
        assert_eq!(member.close_calls(), 2);
        assert!(poll_fn(|cx| member.poll_message(cx)).await.is_none());
        assert!(!member.push("late"));
        assert_eq!(member.delivered(), 0);
    }

    #[tokio::test]
    async fn finish_ends_stream_after_drain() {
        let member = MemoryMember::new("a", "q");
        member.push("last");
        member.finish();

        assert!(poll_fn(|cx| member.poll_message(cx)).await.is_some());
        assert!(poll_fn(|cx| member.poll_message(cx)).await.is_none());
    }

    #[test]
    fn factory_preloads_and_tracks_members() {
        let factory = MemoryFactory::new().with_preload(3);
        let handle = factory.create("a", "jobs", None).unwrap();
        assert_eq!(handle.address(), "a");
        assert_eq!(factory.created(), 1);

        let member = factory.member("a").unwrap();
        assert_eq!(member.queue(), "jobs");
    }

    #[tokio::test]
    async fn finite_factory_members_end_after_preload() {
        let factory = MemoryFactory::new().with_preload(2).finite();
        let handle = factory.create("a", "jobs", None).unwrap();

        assert!(poll_fn(|cx| handle.poll_message(cx)).await.is_some());
        assert!(poll_fn(|cx| handle.poll_message(cx)).await.is_some());
        assert!(poll_fn(|cx| handle.poll_message(cx)).await.is_none());
        assert!(!factory.member("a").unwrap().push("late"));
    }

    #[test]
    fn factory_records_retry_policy() {
        let factory = MemoryFactory::new();
        let retry = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        factory.create("a", "jobs", Some(&retry)).unwrap();
        assert_eq!(factory.last_retry(), Some(retry));

        factory.create("b", "jobs", None).unwrap();
        assert_eq!(factory.last_retry(), None);
    }

    #[test]
    fn factory_refuses_until_accepted() {
        let factory = MemoryFactory::new();
        factory.refuse("a");
        let err = factory.create("a", "jobs", None).err().unwrap();
        assert_eq!(err.address, "a");

        factory.accept("a");
        assert!(factory.create("a", "jobs", None).is_ok());
    }
}
