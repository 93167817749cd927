//! Prometheus text exposition format.
//!
//! Renders registry samples for scraping by a Prometheus server or
//! compatible agent. Scoped names such as `kestrel/jobs/messages.ack`
//! become `grabby_kestrel_jobs_messages_ack`.

use crate::registry::{MetricKind, MetricSample};

/// Render samples into Prometheus text format.
pub fn render_prometheus(samples: &[MetricSample]) -> String {
    let mut out = String::new();

    for s in samples {
        let name = metric_name(&s.name);
        let kind = match s.kind {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        };
        out.push_str(&format!("# TYPE {name} {kind}\n"));
        out.push_str(&format!("{name} {}\n", s.value));
    }

    out
}

fn metric_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("grabby_{sanitized}")
}
