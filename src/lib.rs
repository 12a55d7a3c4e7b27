pub mod app;
pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod message;
pub mod metrics;
pub mod producer;
pub mod server;
pub mod state;

pub use app::{FaultReport, MistralOrchestrator, RuntimeEvent, ShutdownPath, ShutdownTimings};
pub use config::MistralConfig;
pub use error::{MistralError, Result};
pub use handler::{Dispatcher, HandlerPool, MetricHandler};
pub use message::{decode_payload, MetricMessage};
pub use metrics::{debug_format_registry, format_line, format_registry, IngestMetrics};
pub use producer::MetricSocket;
pub use server::IngestServer;
pub use state::{HealthPhase, ProcessState};
