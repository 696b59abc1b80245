//! Defines the WebSocket message protocol between the browser client and the API server.

use chrono::Utc;
use duplex_core::{LatencyKind, MetricUpdate, SessionEvent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::backend::MediaOp;

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum ClientMessage {
    /// An ordinary transport event, processed in arrival order.
    Event { event: SessionEvent },
    /// A payload from the urgent out-of-band channel.
    Urgent { payload: serde_json::Value },
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once, right after the upgrade.
    SessionStarted { session_id: Uuid },
    /// A media operation the client must apply to its tracks.
    Media { op: MediaOp },
    /// A latency measurement, in the RTVI metrics shape.
    Metrics { label: &'static str, data: MetricsData },
    /// A frame could not be processed. The session stays open.
    Error { message: String },
}

#[derive(Serialize, Debug, Clone)]
pub struct MetricsData {
    pub service: LatencyKind,
    pub value_ms: u64,
    pub average_ms: u64,
    pub timestamp: i64,
}

impl From<MetricUpdate> for ServerMessage {
    fn from(update: MetricUpdate) -> Self {
        ServerMessage::Metrics {
            label: "rtvi-ai",
            data: MetricsData {
                service: update.kind,
                value_ms: update.value_ms,
                average_ms: update.average_ms,
                timestamp: Utc::now().timestamp_millis(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_event_frame() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "channel": "event",
            "event": { "type": "bot-llm-text", "data": { "text": "Hi" } }
        }))
        .unwrap();
        match msg {
            ClientMessage::Event { event } => {
                assert_eq!(event, SessionEvent::BotLlmText { text: "Hi".into() })
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_client_urgent_frame_keeps_raw_payload() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "channel": "urgent",
            "payload": { "type": "interrupt", "reason": "server-vad" }
        }))
        .unwrap();
        match msg {
            ClientMessage::Urgent { payload } => assert_eq!(payload["type"], "interrupt"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_metrics_message_shape() {
        let msg = ServerMessage::from(MetricUpdate {
            kind: LatencyKind::Stt,
            value_ms: 250,
            average_ms: 240,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "metrics");
        assert_eq!(value["label"], "rtvi-ai");
        assert_eq!(value["data"]["service"], "stt");
        assert_eq!(value["data"]["value_ms"], 250);
        assert_eq!(value["data"]["average_ms"], 240);
    }
}
