use crate::error::{MistralError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

/// One decoded unit of telemetry extracted from an ingestion request.
///
/// A message is immutable once enqueued; ownership moves from the HTTP
/// server to exactly one handler.
#[derive(Debug, Clone)]
pub struct MetricMessage {
    pub id: Uuid,
    pub path: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Wire shape of one submitted metric. The timestamp is optional and
/// defaults to receive time.
#[derive(Debug, Deserialize)]
struct MetricSubmission {
    path: String,
    value: f64,
    timestamp: Option<DateTime<Utc>>,
}

/// Ingestion bodies are either a single metric object or an array of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IngestPayload {
    Single(MetricSubmission),
    Batch(Vec<MetricSubmission>),
}

impl MetricMessage {
    fn from_submission(submission: MetricSubmission, received_at: DateTime<Utc>) -> Result<Self> {
        if submission.path.is_empty() {
            return Err(MistralError::decode("metric path must not be empty"));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            path: submission.path,
            value: submission.value,
            timestamp: submission.timestamp.unwrap_or(received_at),
        })
    }
}

/// Decode an ingestion request body into metric messages.
pub fn decode_payload(body: &[u8]) -> Result<Vec<MetricMessage>> {
    let payload: IngestPayload = serde_json::from_slice(body)
        .map_err(|e| MistralError::decode(format!("invalid metric payload: {}", e)))?;

    let received_at = Utc::now();
    let submissions = match payload {
        IngestPayload::Single(submission) => vec![submission],
        IngestPayload::Batch(submissions) => submissions,
    };

    if submissions.is_empty() {
        return Err(MistralError::decode("empty metric batch"));
    }

    submissions
        .into_iter()
        .map(|s| MetricMessage::from_submission(s, received_at))
        .collect()
}
