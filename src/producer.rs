use crate::app::FaultReport;
use crate::config::ProducerConfig;
use crate::error::MistralError;
use crate::metrics::{format_registry, IngestMetrics};
use prometheus::Registry;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Publishes formatted metric lines and periodic registry snapshots over a
/// TCP socket.
///
/// Socket I/O errors are recoverable at this layer: the connection is
/// dropped, the error goes onto the producer error channel, and the next
/// write reconnects. A publish target that cannot resolve at all is a
/// configuration problem and escalates on the shared fault channel like
/// any component death.
pub struct MetricSocket {
    config: ProducerConfig,
    metrics: IngestMetrics,
    inbound: mpsc::Receiver<String>,
    shutdown: CancellationToken,
    errors: mpsc::Sender<MistralError>,
    fault: mpsc::Sender<FaultReport>,
    debug_formatter: Option<fn(&Registry) -> String>,
    target: Option<SocketAddr>,
    stream: Option<TcpStream>,
}

impl MetricSocket {
    pub fn new(
        config: ProducerConfig,
        metrics: IngestMetrics,
        inbound: mpsc::Receiver<String>,
        shutdown: CancellationToken,
        errors: mpsc::Sender<MistralError>,
        fault: mpsc::Sender<FaultReport>,
    ) -> Self {
        Self {
            config,
            metrics,
            inbound,
            shutdown,
            errors,
            fault,
            debug_formatter: None,
            target: None,
            stream: None,
        }
    }

    /// Install a hook that renders each registry snapshot for debug logging.
    pub fn set_debug_formatter(&mut self, formatter: fn(&Registry) -> String) {
        self.debug_formatter = Some(formatter);
    }

    pub async fn run(mut self) {
        let endpoint = format!("{}:{}", self.config.address, self.config.port);

        self.target = match tokio::net::lookup_host(&endpoint).await {
            Ok(mut addrs) => addrs.next(),
            Err(e) => {
                let report = FaultReport::new(
                    "metric socket",
                    MistralError::producer(format!("cannot resolve {}: {}", endpoint, e)),
                );
                let _ = self.fault.send(report).await;
                return;
            }
        };

        let Some(target) = self.target else {
            let report = FaultReport::new(
                "metric socket",
                MistralError::producer(format!("{} resolved to no addresses", endpoint)),
            );
            let _ = self.fault.send(report).await;
            return;
        };

        info!("Metric socket producer publishing to {}", target);

        let mut snapshot_interval =
            tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        snapshot_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval() fires immediately; skip the startup tick.
        snapshot_interval.reset();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.inbound.close();
                    while let Some(line) = self.inbound.recv().await {
                        self.publish(&line).await;
                    }
                    break;
                }
                line = self.inbound.recv() => match line {
                    Some(line) => self.publish(&line).await,
                    None => break,
                },
                _ = snapshot_interval.tick() => {
                    self.publish_snapshot().await;
                }
            }
        }

        debug!("Metric socket producer stopped");
    }

    async fn publish_snapshot(&mut self) {
        if let Some(formatter) = self.debug_formatter {
            debug!("{}", formatter(self.metrics.registry()));
        }

        let snapshot = format_registry(self.metrics.registry());
        self.publish(&snapshot).await;
    }

    async fn publish(&mut self, payload: &str) {
        if payload.is_empty() {
            return;
        }

        if let Err(e) = self.write(payload).await {
            self.stream = None;
            let report = MistralError::producer(e.to_string());
            if self.errors.try_send(report).is_err() {
                warn!("Producer error channel full, dropping: {}", e);
            }
        }
    }

    async fn write(&mut self, payload: &str) -> std::io::Result<()> {
        if self.stream.is_none() {
            let target = self.target.expect("target resolved before the run loop");
            self.stream = Some(TcpStream::connect(target).await?);
            debug!("Metric socket connected to {}", target);
        }

        let stream = self.stream.as_mut().expect("connected above");
        stream.write_all(payload.as_bytes()).await?;
        if !payload.ends_with('\n') {
            stream.write_all(b"\n").await?;
        }
        stream.flush().await
    }
}
