use super::MistralOrchestrator;
use crate::error::Result;
use crate::handler::HandlerPool;
use crate::metrics::debug_format_registry;
use crate::producer::MetricSocket;
use crate::server::IngestServer;
use tokio::sync::mpsc;
use tracing::info;

const PRODUCER_QUEUE_CAPACITY: usize = 256;

impl MistralOrchestrator {
    /// Launch the metric socket producer, the handler pool, the ingestion
    /// server, and the OS signal forwarders. Startup failures of the
    /// server itself (e.g. a bound port) arrive later as fault reports.
    pub fn start(&mut self) -> Result<()> {
        let outbound = if self.config.producer.enabled {
            let (line_tx, line_rx) = mpsc::channel(PRODUCER_QUEUE_CAPACITY);

            let mut socket = MetricSocket::new(
                self.config.producer.clone(),
                self.metrics.clone(),
                line_rx,
                self.producer_token.clone(),
                self.producer_err_tx.clone(),
                self.fault_tx.clone(),
            );
            socket.set_debug_formatter(debug_format_registry);

            self.producer_join = Some(tokio::spawn(socket.run()));
            info!("Launched metric socket producer");
            Some(line_tx)
        } else {
            None
        };

        // One handler per processing core, fixed for the process lifetime.
        let count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let pool = HandlerPool::spawn(
            count,
            self.config.ingest.handler_queue_capacity,
            self.fault_tx.clone(),
            outbound,
        );

        let server = IngestServer::new(
            &self.config,
            pool.dispatcher(),
            self.health.clone(),
            self.metrics.clone(),
            self.fault_tx.clone(),
            self.server_token.clone(),
        );
        self.server_join = Some(tokio::spawn(server.run()));

        self.pool = Some(pool);
        self.spawn_signal_forwarders();

        Ok(())
    }

    /// Forward OS termination signals into the signal channel so the run
    /// loop can select on them alongside the error channels.
    #[cfg(unix)]
    fn spawn_signal_forwarders(&self) {
        use tokio::signal::unix::{signal, SignalKind};
        use tracing::error;

        let forward = |kind: SignalKind, name: &'static str| {
            let signal_tx = self.signal_tx.clone();
            tokio::spawn(async move {
                let mut stream = match signal(kind) {
                    Ok(stream) => stream,
                    Err(e) => {
                        error!("Failed to register {} handler: {}", name, e);
                        return;
                    }
                };
                if stream.recv().await.is_some() {
                    info!("Received {}", name);
                    let _ = signal_tx.send(name).await;
                }
            });
        };

        forward(SignalKind::terminate(), "SIGTERM");
        forward(SignalKind::interrupt(), "SIGINT");
    }

    #[cfg(not(unix))]
    fn spawn_signal_forwarders(&self) {
        let signal_tx = self.signal_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C");
                let _ = signal_tx.send("CTRL_C").await;
            }
        });
    }
}
