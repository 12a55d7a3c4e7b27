use crate::message::decode_payload;
use axum::extract::State;
use axum::http::StatusCode;
use bytes::Bytes;
use tracing::debug;

use super::ServerState;

/// Metric submission endpoint.
///
/// Success means enqueued, not processed: 202 is returned as soon as every
/// decoded message sits in a handler queue. A full queue blocks the request
/// (backpressure); a closed queue means the drain has begun and the request
/// is turned away.
pub(crate) async fn ingest_handler(
    State(state): State<ServerState>,
    body: Bytes,
) -> StatusCode {
    state.metrics.requests.inc();

    let messages = match decode_payload(&body) {
        Ok(messages) => messages,
        Err(e) => {
            debug!("Rejected ingestion payload: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    for message in messages {
        if state.dispatcher.dispatch(message).await.is_err() {
            return StatusCode::SERVICE_UNAVAILABLE;
        }
        state.metrics.messages.inc();
    }

    StatusCode::ACCEPTED
}

/// Load-balancer health probe. Reads the shared process state flag and
/// nothing else; never touches the handler pool.
pub(crate) async fn health_handler(State(state): State<ServerState>) -> StatusCode {
    if state.health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
