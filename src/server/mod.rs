mod handlers;

use crate::app::FaultReport;
use crate::config::MistralConfig;
use crate::error::MistralError;
use crate::handler::Dispatcher;
use crate::metrics::IngestMetrics;
use crate::state::ProcessState;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use handlers::{health_handler, ingest_handler};

/// Shared state for the axum router
#[derive(Clone)]
pub struct ServerState {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) health: ProcessState,
    pub(crate) metrics: IngestMetrics,
}

/// HTTP front door: metric submissions on the configured path, health
/// checks on `/health`.
pub struct IngestServer {
    listen_addr: String,
    endpoint_path: String,
    state: ServerState,
    fault: mpsc::Sender<FaultReport>,
    shutdown: CancellationToken,
}

impl IngestServer {
    pub fn new(
        config: &MistralConfig,
        dispatcher: Dispatcher,
        health: ProcessState,
        metrics: IngestMetrics,
        fault: mpsc::Sender<FaultReport>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            listen_addr: config.listen_addr(),
            endpoint_path: config.ingest.endpoint_path.clone(),
            state: ServerState {
                dispatcher,
                health,
                metrics,
            },
            fault,
            shutdown,
        }
    }

    /// Serve until the shutdown token is cancelled and open connections
    /// have finished. A bind or serve failure is surfaced once on the
    /// fault channel, exactly like a handler death.
    pub async fn run(self) {
        let app = build_router(&self.endpoint_path, self.state.clone());

        let listener = match tokio::net::TcpListener::bind(&self.listen_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.report(MistralError::server(format!(
                    "failed to bind {}: {}",
                    self.listen_addr, e
                )))
                .await;
                return;
            }
        };

        info!("Ingestion server listening on {}", self.listen_addr);

        let shutdown = self.shutdown.clone();
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        {
            self.report(MistralError::server(format!("serve error: {}", e)))
                .await;
        }
    }

    async fn report(&self, error: MistralError) {
        let _ = self
            .fault
            .send(FaultReport::new("http server", error))
            .await;
    }
}

pub(crate) fn build_router(endpoint_path: &str, state: ServerState) -> Router {
    Router::new()
        .route(endpoint_path, post(ingest_handler))
        .route("/health", get(health_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerPool;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn test_state() -> (ServerState, HandlerPool, mpsc::Receiver<FaultReport>) {
        let (fault_tx, fault_rx) = mpsc::channel(4);
        let pool = HandlerPool::spawn(2, 4, fault_tx, None);
        let state = ServerState {
            dispatcher: pool.dispatcher(),
            health: ProcessState::new(),
            metrics: IngestMetrics::new(""),
        };
        (state, pool, fault_rx)
    }

    fn post_metrics(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/metrics")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_tracks_process_state() {
        let (state, _pool, _fault_rx) = test_state();
        let router = build_router("/api/metrics", state.clone());

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        state.health.set_shutting_down();

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn ingest_accepts_and_counts_messages() {
        let (state, _pool, _fault_rx) = test_state();
        let router = build_router("/api/metrics", state.clone());

        let response = router
            .oneshot(post_metrics(
                r#"[{"path": "a", "value": 1.0}, {"path": "b", "value": 2.0}]"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(state.metrics.requests.get(), 1);
        assert_eq!(state.metrics.messages.get(), 2);
    }

    #[tokio::test]
    async fn ingest_rejects_malformed_payload() {
        let (state, _pool, _fault_rx) = test_state();
        let router = build_router("/api/metrics", state.clone());

        let response = router.oneshot(post_metrics("not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.metrics.requests.get(), 1);
        assert_eq!(state.metrics.messages.get(), 0);
    }

    #[tokio::test]
    async fn ingest_fails_fast_once_handlers_are_gone() {
        let (state, pool, _fault_rx) = test_state();
        let router = build_router("/api/metrics", state);

        pool.signal_shutdown();
        assert!(pool.join(std::time::Duration::from_secs(1)).await);

        let response = router
            .oneshot(post_metrics(r#"{"path": "a", "value": 1.0}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
