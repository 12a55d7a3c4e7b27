use crate::message::MetricMessage;
use chrono::Utc;
use prometheus::{IntCounter, Opts, Registry};
use std::sync::Arc;

/// Ingestion counters maintained by the HTTP server and snapshotted
/// periodically by the metric socket producer.
#[derive(Clone)]
pub struct IngestMetrics {
    registry: Arc<Registry>,
    pub requests: IntCounter,
    pub messages: IntCounter,
}

impl IngestMetrics {
    /// Build the registry with the `mistral` namespace; a non-empty
    /// instance name becomes a const label on every series.
    pub fn new(instance_name: &str) -> Self {
        let registry = Registry::new();

        let requests = IntCounter::with_opts(counter_opts(
            "requests_total",
            "Ingestion requests received",
            instance_name,
        ))
        .expect("requests counter opts are static");

        let messages = IntCounter::with_opts(counter_opts(
            "messages_total",
            "Metric messages accepted",
            instance_name,
        ))
        .expect("messages counter opts are static");

        registry
            .register(Box::new(requests.clone()))
            .expect("fresh registry accepts requests counter");
        registry
            .register(Box::new(messages.clone()))
            .expect("fresh registry accepts messages counter");

        Self {
            registry: Arc::new(registry),
            requests,
            messages,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

fn counter_opts(name: &str, help: &str, instance_name: &str) -> Opts {
    let mut opts = Opts::new(name, help).namespace("mistral");
    if !instance_name.is_empty() {
        opts = opts.const_label("instance", instance_name);
    }
    opts
}

/// Format one metric message as a graphite-style plaintext line.
pub fn format_line(message: &MetricMessage) -> String {
    format!(
        "{} {} {}",
        message.path,
        message.value,
        message.timestamp.timestamp()
    )
}

/// Format a registry snapshot as graphite-style plaintext lines, one per
/// series, label values appended dot-separated to the series name.
pub fn format_registry(registry: &Registry) -> String {
    let now = Utc::now().timestamp();
    let mut lines = String::new();

    for family in registry.gather() {
        for metric in family.get_metric() {
            let mut name = family.get_name().to_string();
            for label in metric.get_label() {
                name.push('.');
                name.push_str(label.get_value());
            }

            let value = if metric.has_counter() {
                metric.get_counter().get_value()
            } else if metric.has_gauge() {
                metric.get_gauge().get_value()
            } else {
                continue;
            };

            lines.push_str(&format!("{} {} {}\n", name, value, now));
        }
    }

    lines
}

/// Human-readable registry snapshot for the debug formatting hook.
pub fn debug_format_registry(registry: &Registry) -> String {
    let mut out = String::from("registry snapshot:\n");

    for family in registry.gather() {
        for metric in family.get_metric() {
            let value = if metric.has_counter() {
                metric.get_counter().get_value()
            } else if metric.has_gauge() {
                metric.get_gauge().get_value()
            } else {
                continue;
            };

            let labels: Vec<String> = metric
                .get_label()
                .iter()
                .map(|l| format!("{}={}", l.get_name(), l.get_value()))
                .collect();

            out.push_str(&format!(
                "  {} [{}] = {}\n",
                family.get_name(),
                labels.join(","),
                value
            ));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn counters_register_and_count() {
        let metrics = IngestMetrics::new("test-instance");
        metrics.requests.inc();
        metrics.messages.inc_by(3);

        assert_eq!(metrics.requests.get(), 1);
        assert_eq!(metrics.messages.get(), 3);
    }

    #[test]
    fn format_line_is_graphite_plaintext() {
        let message = MetricMessage {
            id: Uuid::new_v4(),
            path: "host.cpu.load".to_string(),
            value: 0.5,
            timestamp: "2024-03-01T12:00:00Z".parse().unwrap(),
        };

        assert_eq!(format_line(&message), "host.cpu.load 0.5 1709294400");
    }

    #[test]
    fn registry_snapshot_contains_series() {
        let metrics = IngestMetrics::new("edge-1");
        metrics.requests.inc();

        let snapshot = format_registry(metrics.registry());
        let line = snapshot
            .lines()
            .find(|l| l.starts_with("mistral_requests_total"))
            .expect("requests series present");
        assert!(line.contains("edge-1"));
        assert!(line.contains(" 1 "));
    }

    #[test]
    fn debug_snapshot_lists_labels() {
        let metrics = IngestMetrics::new("edge-1");
        let snapshot = debug_format_registry(metrics.registry());
        assert!(snapshot.contains("mistral_messages_total"));
        assert!(snapshot.contains("instance=edge-1"));
    }
}
