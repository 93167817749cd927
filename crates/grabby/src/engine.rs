//! Fan-in merge engine.
//!
//! A single task that owns the live member set and, on every tick,
//! handles exactly one event chosen by fixed priority:
//!
//! ```text
//! close  >  message  >  member error  >  membership change
//! ```
//!
//! The wait-set is rebuilt from the current members on every tick, so no
//! member future outlives a mutation of the set. Members that are ready
//! in the same class are tried in a freshly shuffled order.
//!
//! A member message only counts as ready while the engine holds a
//! reserved slot in the output channel. A consumer that stops reading
//! therefore stalls delivery but never stalls error or membership
//! handling.

use std::future::{poll_fn, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::StreamExt;
use rand::seq::SliceRandom;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::{self, OwnedPermit};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use grabby_cluster::{Discovery, DiscoveryStream, MembershipTracker, MembershipUpdate, Snapshot};
use grabby_member::{MemberError, ReadMessage};

use crate::error::ReadError;
use crate::metrics::ReaderMetrics;

/// Capacity of the error channel. One slot is always kept free for the
/// terminal signal.
pub(crate) const ERROR_BUFFER: usize = 16;

type Reserve =
    Pin<Box<dyn Future<Output = Result<OwnedPermit<ReadMessage>, SendError<()>>> + Send>>;

/// Resolves once the flag is `true` or its sender is gone.
pub(crate) async fn raised(flag: &mut watch::Receiver<bool>) {
    loop {
        let set = *flag.borrow_and_update();
        if set || flag.changed().await.is_err() {
            return;
        }
    }
}

/// One selected event. Each tick handles exactly one.
enum Event {
    Close,
    /// The merged handle's receiver is gone.
    ConsumerGone,
    Message(String, ReadMessage),
    MemberFailed(String, MemberError),
    Discovery(Discovery),
}

/// What the loop does after handling an event.
enum Step {
    Continue,
    Stop,
}

pub(crate) struct MergeEngine {
    queue: String,
    tracker: MembershipTracker,
    discovery: Option<DiscoveryStream>,
    /// The live handle set. Only this task mutates it.
    members: Snapshot,
    /// False until the first non-empty snapshot arrives.
    running: bool,
    /// Shuffled member order for the current tick.
    order: Vec<String>,
    output: mpsc::Sender<ReadMessage>,
    reserve: Option<Reserve>,
    permit: Option<OwnedPermit<ReadMessage>>,
    errors: mpsc::Sender<ReadError>,
    metrics: Arc<ReaderMetrics>,
}

impl MergeEngine {
    pub(crate) fn new(
        tracker: MembershipTracker,
        discovery: DiscoveryStream,
        output: mpsc::Sender<ReadMessage>,
        errors: mpsc::Sender<ReadError>,
        metrics: Arc<ReaderMetrics>,
    ) -> Self {
        Self {
            queue: tracker.queue().to_string(),
            tracker,
            discovery: Some(discovery),
            members: Snapshot::new(),
            running: false,
            order: Vec::new(),
            output,
            reserve: None,
            permit: None,
            errors,
            metrics,
        }
    }

    /// Run until closed or until every member is gone.
    ///
    /// `done` flips to `true` once the terminal signal has been sent and
    /// every member has been asked to close.
    pub(crate) async fn run(mut self, mut shutdown: watch::Receiver<bool>, done: watch::Sender<bool>) {
        debug!(queue = %self.queue, "merge engine awaiting membership");

        loop {
            if self.running && self.members.is_empty() {
                self.terminate(ReadError::AllHandlesDied);
                break;
            }

            self.order.clear();
            self.order.extend(self.members.keys().cloned());
            self.order.shuffle(&mut rand::thread_rng());

            let event = tokio::select! {
                biased;
                _ = raised(&mut shutdown) => Event::Close,
                event = poll_fn(|cx| self.poll_event(cx)) => event,
            };

            if let Step::Stop = self.handle(event) {
                break;
            }
        }

        done.send_replace(true);
    }

    fn handle(&mut self, event: Event) -> Step {
        match event {
            Event::Close => {
                self.close_all();
                self.terminate(ReadError::ReadClosed);
                Step::Stop
            }
            Event::ConsumerGone => {
                debug!(queue = %self.queue, "merged receiver dropped");
                self.close_all();
                self.terminate(ReadError::ReadClosed);
                Step::Stop
            }
            Event::Message(address, msg) => {
                match self.permit.take() {
                    Some(permit) => {
                        trace!(%address, bytes = msg.bytes().len(), "forwarding message");
                        permit.send(self.metrics.track(msg));
                    }
                    // Unreachable: messages are only polled with a permit held.
                    None => msg.abort(),
                }
                Step::Continue
            }
            Event::MemberFailed(address, error) => {
                if let Some(member) = self.members.remove(&address) {
                    member.close();
                }
                self.tracker.forget(&address);
                self.metrics.set_members(self.members.len());
                warn!(
                    %address,
                    queue = %self.queue,
                    %error,
                    remaining = self.members.len(),
                    "member read handle failed"
                );

                if self.members.is_empty() {
                    self.terminate(ReadError::AllHandlesDied);
                    return Step::Stop;
                }
                Step::Continue
            }
            Event::Discovery(report) => {
                match self.tracker.apply(report) {
                    MembershipUpdate::Snapshot(next) => self.adopt(next),
                    MembershipUpdate::Failed(cause) => self.report_discovery_failure(cause),
                }
                Step::Continue
            }
        }
    }

    /// Swap in a new member set, closing members that left.
    ///
    /// An empty set is not acted on here; the next tick reports exhaustion
    /// once the departed members have been closed.
    fn adopt(&mut self, next: Snapshot) {
        if !self.running {
            if next.is_empty() {
                debug!(queue = %self.queue, "ignoring empty membership before start");
                return;
            }
            self.running = true;
            info!(queue = %self.queue, members = next.len(), "merged reader started");
        }

        for (address, member) in &self.members {
            let kept = next
                .get(address)
                .is_some_and(|other| Arc::ptr_eq(other, member));
            if !kept {
                member.close();
                info!(%address, queue = %self.queue, "member removed from read set");
            }
        }

        self.members = next;
        self.metrics.set_members(self.members.len());
    }

    fn close_all(&mut self) {
        for (address, member) in &self.members {
            member.close();
            debug!(%address, queue = %self.queue, "closing member on shutdown");
        }
        info!(queue = %self.queue, members = self.members.len(), "merged reader closed");
        self.members.clear();
        self.metrics.set_members(0);
    }

    /// Queue a discovery failure unless only the terminal slot is left.
    fn report_discovery_failure(&mut self, cause: String) {
        if self.errors.capacity() <= 1 {
            warn!(queue = %self.queue, %cause, "error channel full; dropping discovery failure");
            return;
        }
        let _ = self.errors.try_send(ReadError::Discovery(cause));
    }

    /// Deliver the terminal signal. The sender is dropped with the engine.
    fn terminate(&mut self, signal: ReadError) {
        if let ReadError::AllHandlesDied = signal {
            warn!(queue = %self.queue, "all member read handles died");
        }
        self.permit = None;
        self.reserve = None;
        // A slot is always left free, so this only fails once the receiver is gone.
        let _ = self.errors.try_send(signal);
    }

    /// Poll every non-close event source in priority order.
    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Event> {
        let mut ended = None;

        match self.poll_demand(cx) {
            Poll::Ready(Ok(())) => {
                for address in &self.order {
                    let Some(member) = self.members.get(address) else {
                        continue;
                    };
                    match member.poll_message(cx) {
                        Poll::Ready(Some(msg)) => {
                            return Poll::Ready(Event::Message(address.clone(), msg));
                        }
                        Poll::Ready(None) => {
                            ended.get_or_insert_with(|| address.clone());
                        }
                        Poll::Pending => {}
                    }
                }
            }
            Poll::Ready(Err(())) => return Poll::Ready(Event::ConsumerGone),
            Poll::Pending => {}
        }

        if let Some(address) = ended {
            let error = MemberError::Ended {
                address: address.clone(),
            };
            return Poll::Ready(Event::MemberFailed(address, error));
        }

        for address in &self.order {
            let Some(member) = self.members.get(address) else {
                continue;
            };
            if let Poll::Ready(error) = member.poll_error(cx) {
                return Poll::Ready(Event::MemberFailed(address.clone(), error));
            }
        }

        if let Some(discovery) = self.discovery.as_mut() {
            match discovery.poll_next_unpin(cx) {
                Poll::Ready(Some(report)) => return Poll::Ready(Event::Discovery(report)),
                Poll::Ready(None) => {
                    debug!(queue = %self.queue, "discovery source ended; membership is now fixed");
                    self.discovery = None;
                }
                Poll::Pending => {}
            }
        }

        Poll::Pending
    }

    /// Ready once a slot in the output channel is reserved.
    fn poll_demand(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), ()>> {
        if self.permit.is_some() {
            return Poll::Ready(Ok(()));
        }

        let reserve = self
            .reserve
            .get_or_insert_with(|| Box::pin(self.output.clone().reserve_owned()));

        match reserve.as_mut().poll(cx) {
            Poll::Ready(Ok(permit)) => {
                self.reserve = None;
                self.permit = Some(permit);
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(_)) => {
                self.reserve = None;
                Poll::Ready(Err(()))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
