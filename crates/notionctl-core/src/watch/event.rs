//! Watch stream events and sinks

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::changes::ChangeWindow;
use crate::client::Page;

/// One inbound push notification
///
/// Created by the webhook receiver and consumed once by the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub payload: Vec<u8>,
    pub event_type: String,
    pub delivery_id: String,
    pub received_at: DateTime<Utc>,
}

impl Delivery {
    pub fn new(payload: Vec<u8>, delivery_id: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            event_type: extract_event_type(&payload),
            payload,
            delivery_id: delivery_id.into(),
            received_at,
        }
    }

    /// Payload as JSON, or as a string when it is not JSON
    pub fn payload_json(&self) -> Value {
        serde_json::from_slice(&self.payload)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&self.payload).into_owned()))
    }
}

/// Event type from `event.type`, falling back to top-level `type`
pub fn extract_event_type(payload: &[u8]) -> String {
    #[derive(Deserialize)]
    struct Inner {
        #[serde(rename = "type", default)]
        kind: String,
    }
    #[derive(Deserialize)]
    struct Outer {
        #[serde(rename = "type", default)]
        kind: String,
        #[serde(default)]
        event: Option<Inner>,
    }

    let Ok(outer) = serde_json::from_slice::<Outer>(payload) else {
        return String::new();
    };
    match outer.event {
        Some(inner) if !inner.kind.is_empty() => inner.kind,
        _ => outer.kind,
    }
}

/// One entry of the watch output stream
///
/// Poll events are complete and ordered within their window; webhook events
/// are best-effort and may repeat changes a later poll reports again.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WatchEvent {
    Poll {
        window: ChangeWindow,
        count: usize,
        pages: Vec<Page>,
    },
    Webhook {
        event_type: String,
        delivery_id: String,
        received_at: DateTime<Utc>,
        raw: Value,
    },
}

impl WatchEvent {
    pub fn poll(window: ChangeWindow, pages: Vec<Page>) -> Self {
        WatchEvent::Poll {
            window,
            count: pages.len(),
            pages,
        }
    }

    pub fn webhook(delivery: &Delivery) -> Self {
        WatchEvent::Webhook {
            event_type: delivery.event_type.clone(),
            delivery_id: delivery.delivery_id.clone(),
            received_at: delivery.received_at,
            raw: delivery.payload_json(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WatchEvent::Poll { .. } => "poll",
            WatchEvent::Webhook { .. } => "webhook",
        }
    }
}

/// Where the reconciler writes events
pub trait WatchSink: Send {
    fn emit(&mut self, event: &WatchEvent) -> io::Result<()>;
}

impl WatchSink for Vec<WatchEvent> {
    fn emit(&mut self, event: &WatchEvent) -> io::Result<()> {
        self.push(event.clone());
        Ok(())
    }
}

/// Writes one JSON object per line
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> WatchSink for JsonLinesSink<W> {
    fn emit(&mut self, event: &WatchEvent) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_extract_event_type() {
        assert_eq!(
            extract_event_type(br#"{"type":"outer","event":{"type":"page.created"}}"#),
            "page.created"
        );
        assert_eq!(extract_event_type(br#"{"type":"page.deleted"}"#), "page.deleted");
        assert_eq!(
            extract_event_type(br#"{"type":"outer","event":{"type":""}}"#),
            "outer"
        );
        assert_eq!(extract_event_type(b"not json"), "");
    }

    #[test]
    fn test_webhook_event_json() {
        let delivery = Delivery::new(br#"{"type":"page.created"}"#.to_vec(), "d-1", at());
        let value = serde_json::to_value(WatchEvent::webhook(&delivery)).unwrap();

        assert_eq!(value["kind"], "webhook");
        assert_eq!(value["event_type"], "page.created");
        assert_eq!(value["delivery_id"], "d-1");
        assert_eq!(value["raw"]["type"], "page.created");
        assert_eq!(value["received_at"], "2025-03-01T12:00:00Z");
    }

    #[test]
    fn test_non_json_payload_kept_as_string() {
        let delivery = Delivery::new(b"ping".to_vec(), "", at());
        assert_eq!(delivery.payload_json(), Value::String("ping".to_string()));
    }

    #[test]
    fn test_json_lines_sink() {
        let window = ChangeWindow::new(at(), at(), true);
        let mut sink = JsonLinesSink::new(Vec::new());

        sink.emit(&WatchEvent::poll(window, Vec::new())).unwrap();
        sink.emit(&WatchEvent::poll(window, Vec::new())).unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["kind"], "poll");
        assert_eq!(first["count"], 0);
        assert_eq!(first["window"]["lower_inclusive"], true);
        assert_eq!(first["window"]["since"], "2025-03-01T12:00:00Z");
    }
}
