// Stream envelope: `{ "type": <tag>, "data": <payload> }`

use serde::{Deserialize, Serialize};

use super::{AnomalyEvent, Snapshot};

/// Payload of an `error` frame. The backend sends either a bare string or an
/// object with a message and optional code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorData {
    Message(String),
    Detailed {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl ErrorData {
    pub fn message(&self) -> &str {
        match self {
            ErrorData::Message(m) => m,
            ErrorData::Detailed { message, .. } => message,
        }
    }
}

/// Canonical inbound tag set: `metrics`, `anomaly`, `connected`, `error`.
/// Any other tag is a decode error and the frame is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum StreamMessage {
    Metrics(Snapshot),
    Anomaly(AnomalyEvent),
    Connected(String),
    Error(ErrorData),
}

impl StreamMessage {
    /// Decode one text or binary frame.
    pub fn decode(frame: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(frame)
    }

    /// Tag as it appears on the wire (for logging).
    pub fn kind(&self) -> &'static str {
        match self {
            StreamMessage::Metrics(_) => "metrics",
            StreamMessage::Anomaly(_) => "anomaly",
            StreamMessage::Connected(_) => "connected",
            StreamMessage::Error(_) => "error",
        }
    }
}
