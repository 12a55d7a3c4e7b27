use super::types::{RuntimeEvent, ShutdownPath};
use super::MistralOrchestrator;
use crate::error::{MistralError, Result};
use tracing::{error, info, warn};

impl MistralOrchestrator {
    /// Block until a shutdown trigger commits, run the drain sequence, and
    /// return the process exit code (0 graceful, 1 fault).
    pub async fn run(&mut self) -> Result<i32> {
        info!("Mistral is running");

        let path = loop {
            let event = self.next_event().await?;
            match Self::evaluate(&event) {
                None => self.observe(event),
                Some(path) => {
                    self.commit(&event, path);
                    break path;
                }
            }
        };

        if path == ShutdownPath::Graceful {
            // Give the load balancer time to observe the failing health
            // check and remove this instance from service before any
            // teardown begins. This wait is time-based on purpose and is
            // never cut short.
            info!(
                "Waiting {:?} for the load balancer to drain this instance",
                self.timings.grace_period
            );
            tokio::time::sleep(self.timings.grace_period).await;
        }

        self.drain(path).await;

        Ok(path.exit_code())
    }

    /// Multiplex the three event sources into one tagged stream. First
    /// event observed wins; concurrent arrivals on the other sources are
    /// simply not examined this round.
    async fn next_event(&mut self) -> Result<RuntimeEvent> {
        tokio::select! {
            signal = self.signal_rx.recv() => signal
                .map(RuntimeEvent::Signal)
                .ok_or_else(|| MistralError::system("signal channel closed")),
            report = self.fault_rx.recv() => report
                .map(RuntimeEvent::Fault)
                .ok_or_else(|| MistralError::system("fault channel closed")),
            e = self.producer_err_rx.recv() => e
                .map(RuntimeEvent::TransportError)
                .ok_or_else(|| MistralError::system("producer error channel closed")),
        }
    }

    /// Transition table for the Running state. Transport errors on the
    /// outbound leg never tear down inbound ingestion; only operator
    /// signals and component faults commit a shutdown path.
    pub(crate) fn evaluate(event: &RuntimeEvent) -> Option<ShutdownPath> {
        match event {
            RuntimeEvent::Signal(_) => Some(ShutdownPath::Graceful),
            RuntimeEvent::Fault(_) => Some(ShutdownPath::Fault),
            RuntimeEvent::TransportError(_) => None,
        }
    }

    fn observe(&self, event: RuntimeEvent) {
        if let RuntimeEvent::TransportError(e) = event {
            warn!("Metric socket error: {}", e);
        }
    }

    /// Flip the health flag before anything else so every subsequent
    /// health check already reflects the committed path.
    fn commit(&self, event: &RuntimeEvent, path: ShutdownPath) {
        match path {
            ShutdownPath::Graceful => {
                self.health.set_shutting_down();
                if let RuntimeEvent::Signal(name) = event {
                    info!("{} received, committing to graceful shutdown", name);
                }
            }
            ShutdownPath::Fault => {
                self.health.set_unavailable();
                if let RuntimeEvent::Fault(report) = event {
                    error!(
                        "Component '{}' died: {}; committing to fault shutdown",
                        report.component, report.error
                    );
                }
            }
        }
    }
}
