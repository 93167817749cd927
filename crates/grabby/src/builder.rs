//! Assembles a merged reader from its collaborators.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::info;

use grabby_cluster::{DiscoveryStream, MembershipTracker};
use grabby_member::MemberFactory;
use grabby_metrics::{MetricsSink, Scoped};

use crate::config::ReaderConfig;
use crate::engine::{MergeEngine, ERROR_BUFFER};
use crate::error::ConfigError;
use crate::handle::MergedHandle;
use crate::metrics::ReaderMetrics;

/// Build a merged reader and start its engine.
///
/// Must be called from within a Tokio runtime. Members are opened through
/// `factory` as `discovery` reports their addresses; metrics are written
/// to `metrics`, scoped by `config.stats_scope` when set.
///
/// Readers sharing one sink without distinct scopes report the sum of
/// their values under the same names. [`MergedHandle::num_members`] is
/// always the reader's own count.
pub fn build(
    discovery: DiscoveryStream,
    config: &ReaderConfig,
    factory: Arc<dyn MemberFactory>,
    metrics: Arc<dyn MetricsSink>,
) -> Result<MergedHandle, ConfigError> {
    config.validate()?;

    let sink: Arc<dyn MetricsSink> = match &config.stats_scope {
        Some(scope) => Arc::new(Scoped::new(metrics, scope)),
        None => metrics,
    };
    let metrics = Arc::new(ReaderMetrics::new(sink, config.track_outstanding));

    let tracker = MembershipTracker::new(&config.queue, factory).with_retry(config.retry.clone());
    let (msg_tx, msg_rx) = mpsc::channel(config.buffer);
    let (err_tx, err_rx) = mpsc::channel(ERROR_BUFFER);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (done_tx, done_rx) = watch::channel(false);

    let engine = MergeEngine::new(tracker, discovery, msg_tx, err_tx, metrics.clone());
    tokio::spawn(engine.run(shutdown_rx, done_tx));

    info!(
        queue = %config.queue,
        track_outstanding = config.track_outstanding,
        "merged reader built"
    );

    Ok(MergedHandle::new(
        config.queue.clone(),
        msg_rx,
        err_rx,
        shutdown_tx,
        done_rx,
        metrics,
    ))
}
