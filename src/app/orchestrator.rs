use super::types::{FaultReport, ShutdownTimings};
use crate::config::MistralConfig;
use crate::error::MistralError;
use crate::handler::HandlerPool;
use crate::metrics::IngestMetrics;
use crate::state::ProcessState;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const FAULT_CHANNEL_CAPACITY: usize = 32;
const PRODUCER_ERROR_CAPACITY: usize = 32;

/// Process lifecycle coordinator: starts the producer, the handler pool
/// and the HTTP server, multiplexes shutdown triggers, and drives the
/// timed drain sequence.
pub struct MistralOrchestrator {
    pub(super) config: MistralConfig,
    pub(super) health: ProcessState,
    pub(super) metrics: IngestMetrics,
    pub(super) timings: ShutdownTimings,

    // Shared fault channel. The orchestrator keeps one sender clone so
    // recv() cannot observe a closed channel while components wind down.
    pub(super) fault_tx: mpsc::Sender<FaultReport>,
    pub(super) fault_rx: mpsc::Receiver<FaultReport>,

    pub(super) producer_err_tx: mpsc::Sender<MistralError>,
    pub(super) producer_err_rx: mpsc::Receiver<MistralError>,

    // OS signals are forwarded into this channel so the run loop can
    // select on them like any other event source.
    pub(super) signal_tx: mpsc::Sender<&'static str>,
    pub(super) signal_rx: mpsc::Receiver<&'static str>,

    pub(super) pool: Option<HandlerPool>,
    pub(super) producer_token: CancellationToken,
    pub(super) producer_join: Option<JoinHandle<()>>,
    pub(super) server_token: CancellationToken,
    pub(super) server_join: Option<JoinHandle<()>>,
}

impl MistralOrchestrator {
    pub fn new(config: MistralConfig) -> Self {
        Self::with_timings(config, ShutdownTimings::default())
    }

    /// Construct with explicit drain timings; tests use compressed values.
    pub fn with_timings(config: MistralConfig, timings: ShutdownTimings) -> Self {
        let (fault_tx, fault_rx) = mpsc::channel(FAULT_CHANNEL_CAPACITY);
        let (producer_err_tx, producer_err_rx) = mpsc::channel(PRODUCER_ERROR_CAPACITY);
        let (signal_tx, signal_rx) = mpsc::channel(1);

        let metrics = IngestMetrics::new(&config.misc.instance_name);

        Self {
            config,
            health: ProcessState::new(),
            metrics,
            timings,
            fault_tx,
            fault_rx,
            producer_err_tx,
            producer_err_rx,
            signal_tx,
            signal_rx,
            pool: None,
            producer_token: CancellationToken::new(),
            producer_join: None,
            server_token: CancellationToken::new(),
            server_join: None,
        }
    }

    /// Handle for health observers (the HTTP server holds one too).
    pub fn health(&self) -> ProcessState {
        self.health.clone()
    }

    pub fn metrics(&self) -> IngestMetrics {
        self.metrics.clone()
    }

    /// Sender clone for components that escalate fatal errors.
    pub fn fault_sender(&self) -> mpsc::Sender<FaultReport> {
        self.fault_tx.clone()
    }

    /// Sender clone for the metric socket's recoverable errors.
    pub fn producer_error_sender(&self) -> mpsc::Sender<MistralError> {
        self.producer_err_tx.clone()
    }

    /// Sender clone feeding the signal arm of the run loop; tests use this
    /// to deliver synthetic termination signals.
    pub fn signal_sender(&self) -> mpsc::Sender<&'static str> {
        self.signal_tx.clone()
    }
}
