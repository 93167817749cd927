//! Discovery reports and the sources that produce them.

use std::collections::BTreeSet;
use std::pin::Pin;

use futures::channel::mpsc;
use futures::stream::{self, Stream, StreamExt};

/// One report from the naming layer about the queue's member addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// The name resolved to exactly these addresses.
    Bound(BTreeSet<String>),
    /// Resolution is in progress; keep what we have.
    Pending,
    /// The name is known not to exist.
    Negative,
    /// Resolution failed.
    Failed(String),
}

impl Discovery {
    pub fn bound<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Discovery::Bound(addresses.into_iter().map(Into::into).collect())
    }
}

/// A boxed discovery source.
pub type DiscoveryStream = Pin<Box<dyn Stream<Item = Discovery> + Send>>;

/// A fixed host list: one `Bound` report, then nothing further.
///
/// The stream stays open so the reader never sees the source end.
pub fn fixed<I, S>(addresses: I) -> DiscoveryStream
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    stream::once(futures::future::ready(Discovery::bound(addresses)))
        .chain(stream::pending())
        .boxed()
}

/// Parse a comma-separated host list (`"host1:22133, host2:22133"`).
pub fn parse_hosts(hosts: &str) -> BTreeSet<String> {
    hosts
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

/// Push side of a dynamic discovery source.
#[derive(Clone)]
pub struct DiscoveryPublisher {
    tx: mpsc::UnboundedSender<Discovery>,
}

impl DiscoveryPublisher {
    /// Publish a report. Returns `false` once the reader is gone.
    pub fn publish(&self, report: Discovery) -> bool {
        self.tx.unbounded_send(report).is_ok()
    }

    pub fn bound<I, S>(&self, addresses: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.publish(Discovery::bound(addresses))
    }

    pub fn pending(&self) -> bool {
        self.publish(Discovery::Pending)
    }

    pub fn negative(&self) -> bool {
        self.publish(Discovery::Negative)
    }

    pub fn failed(&self, cause: impl Into<String>) -> bool {
        self.publish(Discovery::Failed(cause.into()))
    }
}

/// A dynamic discovery source fed through a [`DiscoveryPublisher`].
///
/// The stream ends when every publisher is dropped.
pub fn channel() -> (DiscoveryPublisher, DiscoveryStream) {
    let (tx, rx) = mpsc::unbounded();
    (DiscoveryPublisher { tx }, rx.boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn bound_collects_addresses() {
        let report = Discovery::bound(["b:1", "a:1", "a:1"]);
        assert_eq!(
            report,
            Discovery::Bound(BTreeSet::from(["a:1".to_string(), "b:1".to_string()]))
        );
    }

    #[test]
    fn parse_hosts_trims_and_skips_empty() {
        let hosts = parse_hosts(" q1:22133, q2:22133,,q1:22133 ");
        assert_eq!(hosts.len(), 2);
        assert!(hosts.contains("q1:22133"));
        assert!(hosts.contains("q2:22133"));
    }

    #[tokio::test]
    async fn fixed_yields_once_then_idles() {
        let mut source = fixed(["a:1"]);
        assert_eq!(source.next().await, Some(Discovery::bound(["a:1"])));

        let next = tokio::time::timeout(Duration::from_millis(20), source.next()).await;
        assert!(next.is_err(), "fixed source should stay open");
    }

    #[tokio::test]
    async fn channel_delivers_in_order_and_ends() {
        let (publisher, mut source) = channel();
        assert!(publisher.bound(["a:1"]));
        assert!(publisher.pending());
        assert!(publisher.failed("timeout"));
        drop(publisher);

        assert_eq!(source.next().await, Some(Discovery::bound(["a:1"])));
        assert_eq!(source.next().await, Some(Discovery::Pending));
        assert_eq!(
            source.next().await,
            Some(Discovery::Failed("timeout".to_string()))
        );
        assert_eq!(source.next().await, None);
    }

    #[test]
    fn publish_after_reader_dropped_fails() {
        let (publisher, source) = channel();
        drop(source);
        assert!(!publisher.negative());
    }
}
