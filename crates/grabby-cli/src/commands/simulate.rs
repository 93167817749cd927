use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use grabby::{discovery, MergedHandle, ReadError, ReaderConfig};
use grabby_member::MemoryFactory;
use grabby_metrics::{render_prometheus, MetricSample, MetricsRegistry};

pub struct Options {
    pub members: usize,
    pub messages: usize,
    pub kill: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct Report {
    queue: String,
    received: u64,
    per_member: BTreeMap<String, u64>,
    killed: Vec<String>,
    terminal: Option<String>,
    metrics: Vec<MetricSample>,
}

/// Consumption state while the simulation runs.
#[derive(Default)]
struct Tally {
    received: u64,
    per_member: BTreeMap<String, u64>,
    killed: Vec<String>,
    terminal: Option<ReadError>,
}

pub async fn run(config: &ReaderConfig, options: &Options, format: &str) -> anyhow::Result<()> {
    if options.members == 0 {
        anyhow::bail!("--members must be at least 1");
    }
    if options.kill > options.members {
        anyhow::bail!(
            "cannot kill {} of {} members",
            options.kill,
            options.members
        );
    }

    let addresses: Vec<String> = (1..=options.members)
        .map(|i| format!("10.0.0.{i}:22133"))
        .collect();

    let factory = Arc::new(MemoryFactory::new().with_preload(options.messages).finite());
    let registry = MetricsRegistry::new();
    let (publisher, source) = discovery::channel();
    publisher.bound(addresses.iter().cloned());

    let mut handle = grabby::build(source, config, factory.clone(), Arc::new(registry.clone()))?;
    info!(
        queue = %config.queue,
        members = options.members,
        messages = options.messages,
        kill = options.kill,
        "simulation started"
    );

    let victims = &addresses[..options.kill];
    let kill_after = kill_threshold(options.members, options.messages);
    let mut tally = Tally::default();

    let deadline = Duration::from_secs(options.timeout_secs);
    let consumed = tokio::time::timeout(
        deadline,
        consume(&mut handle, &factory, victims, kill_after, &mut tally),
    )
    .await;
    if consumed.is_err() {
        warn!(queue = %config.queue, "simulation timed out; closing reader");
    }

    let metrics = registry.snapshot();
    handle.close().await;
    if tally.terminal.is_none() {
        tally.terminal = handle.next_error().await;
    }

    let report = Report {
        queue: config.queue.clone(),
        received: tally.received,
        per_member: tally.per_member,
        killed: tally.killed,
        terminal: tally.terminal.map(|e| e.to_string()),
        metrics,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print!("{}", format_report(&report)),
    }

    Ok(())
}

/// Number of received messages after which victims are failed: half of
/// everything preloaded.
fn kill_threshold(members: usize, messages: usize) -> u64 {
    (members.saturating_mul(messages) / 2) as u64
}

/// Read the merged stream until it ends, failing `victims` once
/// `kill_after` messages have been received, then collect the terminal
/// signal.
async fn consume(
    handle: &mut MergedHandle,
    factory: &MemoryFactory,
    victims: &[String],
    kill_after: u64,
    tally: &mut Tally,
) {
    while let Some(msg) = handle.recv().await {
        let payload = String::from_utf8_lossy(msg.bytes()).into_owned();
        let member = payload.split('/').next().unwrap_or_default().to_string();
        *tally.per_member.entry(member).or_default() += 1;
        tally.received += 1;
        msg.ack();

        if tally.killed.is_empty() && !victims.is_empty() && tally.received >= kill_after {
            for address in victims {
                if let Some(member) = factory.member(address) {
                    member.fail("killed by simulator");
                    tally.killed.push(address.clone());
                }
            }
            info!(killed = tally.killed.len(), "members failed");
        }
    }

    while let Some(err) = handle.next_error().await {
        if err.is_terminal() {
            info!(%err, "reader terminated");
            tally.terminal = Some(err);
        } else {
            warn!(%err, "reader reported an error");
        }
    }
}

fn format_report(report: &Report) -> String {
    let mut out = String::new();
    out.push_str(&format!("queue:    {}\n", report.queue));
    out.push_str(&format!("received: {}\n", report.received));
    out.push_str(&format!(
        "ended:    {}\n",
        report.terminal.as_deref().unwrap_or("still running")
    ));
    out.push('\n');
    for (member, count) in &report.per_member {
        let marker = if report.killed.contains(member) { " (killed)" } else { "" };
        out.push_str(&format!("  {member:<20} {count:>8}{marker}\n"));
    }
    out.push('\n');
    out.push_str(&render_prometheus(&report.metrics));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_report_lists_members_and_metrics() {
        let report = Report {
            queue: "jobs".to_string(),
            received: 3,
            per_member: BTreeMap::from([
                ("10.0.0.1:22133".to_string(), 2),
                ("10.0.0.2:22133".to_string(), 1),
            ]),
            killed: vec!["10.0.0.2:22133".to_string()],
            terminal: Some(ReadError::AllHandlesDied.to_string()),
            metrics: Vec::new(),
        };

        let text = format_report(&report);
        assert!(text.contains("received: 3"));
        assert!(text.contains("all member read handles died"));
        assert!(text.contains("10.0.0.2:22133"));
        assert!(text.contains("(killed)"));
    }

    #[test]
    fn kill_threshold_is_half_and_saturates() {
        assert_eq!(kill_threshold(3, 100), 150);
        assert_eq!(kill_threshold(usize::MAX, 2), (usize::MAX / 2) as u64);
    }

    #[tokio::test]
    async fn every_message_is_read_until_members_drain() {
        let factory = Arc::new(MemoryFactory::new().with_preload(50).finite());
        let registry = MetricsRegistry::new();
        let (publisher, source) = discovery::channel();
        publisher.bound(["a", "b"]);
        let config = ReaderConfig::new("jobs").with_tracking(true);
        let mut handle =
            grabby::build(source, &config, factory.clone(), Arc::new(registry.clone())).unwrap();

        let mut tally = Tally::default();
        tokio::time::timeout(
            Duration::from_secs(5),
            consume(&mut handle, &factory, &[], u64::MAX, &mut tally),
        )
        .await
        .unwrap();

        assert_eq!(tally.received, 100);
        assert_eq!(tally.per_member.get("a"), Some(&50));
        assert_eq!(tally.per_member.get("b"), Some(&50));
        assert_eq!(tally.terminal, Some(ReadError::AllHandlesDied));
        assert_eq!(registry.counter_value("messages.ack"), Some(100));
    }
}
