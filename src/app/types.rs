use crate::error::MistralError;
use std::time::Duration;

/// A fatal component error, surfaced exactly once on the shared fault
/// channel before the reporting component stops doing useful work.
#[derive(Debug)]
pub struct FaultReport {
    pub component: String,
    pub error: MistralError,
}

impl FaultReport {
    pub fn new<S: Into<String>>(component: S, error: MistralError) -> Self {
        Self {
            component: component.into(),
            error,
        }
    }
}

/// Tagged fan-in of the three event sources the running orchestrator
/// multiplexes: operator signals, component faults, and recoverable metric
/// socket errors.
#[derive(Debug)]
pub enum RuntimeEvent {
    Signal(&'static str),
    Fault(FaultReport),
    TransportError(MistralError),
}

/// Which shutdown path the orchestrator committed to. The exit code is the
/// only externally observable record of the path taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPath {
    Graceful,
    Fault,
}

impl ShutdownPath {
    pub fn exit_code(self) -> i32 {
        match self {
            ShutdownPath::Graceful => 0,
            ShutdownPath::Fault => 1,
        }
    }
}

/// Timing constants of the drain sequence.
///
/// Production uses the defaults; tests inject compressed intervals so the
/// full state machine runs without real wall-clock waits. These are not
/// exposed in the configuration file.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownTimings {
    /// Wait between committing to graceful shutdown and draining, sized to
    /// outlast the load balancer's health-check polling interval.
    pub grace_period: Duration,
    /// Quiet window for collecting straggler errors once draining begins.
    pub drain_window: Duration,
    /// Upper bound on waiting for handler and producer tasks to exit.
    pub join_timeout: Duration,
    /// Upper bound on the HTTP server connection drain.
    pub http_shutdown_timeout: Duration,
}

impl Default for ShutdownTimings {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(95),
            drain_window: Duration::from_millis(10),
            join_timeout: Duration::from_secs(1),
            http_shutdown_timeout: Duration::from_secs(5),
        }
    }
}
