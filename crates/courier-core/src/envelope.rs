//! Wire envelope and newline-delimited frame codec.
//!
//! The relay never interprets payload contents; the only field it touches
//! is the correlation id, carried on the wire as [`CORRELATION_FIELD`]
//! inside the payload object. Inbound frames use the tolerant reader
//! pattern: a frame without the field still parses, with `id: None`, and
//! the caller decides what to do with it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// JSON field carrying the correlation id on both wire directions.
pub const CORRELATION_FIELD: &str = "_relay_id";

/// A correlated request envelope: the broker-issued id plus the producer's
/// opaque payload. This is what travels through the delivery queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub payload: Value,
}

impl Envelope {
    /// Create an envelope with a freshly issued correlation id.
    pub fn new(payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
        }
    }

    /// The payload with the correlation field injected, ready for delivery.
    ///
    /// Non-object payloads cannot carry an extra field, so they are wrapped
    /// as `{"_relay_id": ..., "payload": ...}` instead.
    pub fn tagged(&self) -> Value {
        match &self.payload {
            Value::Object(map) => {
                let mut map = map.clone();
                map.insert(CORRELATION_FIELD.to_string(), Value::String(self.id.clone()));
                Value::Object(map)
            }
            other => serde_json::json!({
                CORRELATION_FIELD: self.id,
                "payload": other,
            }),
        }
    }

    /// Serialize to a single wire frame (no trailing newline).
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.tagged())?)
    }
}

/// A parsed inbound frame: the correlation id (if the frame carried one)
/// and the remaining payload, forwarded verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub id: Option<String>,
    pub payload: Value,
}

/// Parse one newline-delimited frame from a consumer.
///
/// The correlation field is stripped out of the payload; everything else is
/// left untouched.
pub fn parse_frame(line: &str) -> Result<InboundFrame> {
    let raw: Value = serde_json::from_str(line)?;
    Ok(split_correlation(raw))
}

/// Split the correlation id out of a JSON value.
pub fn split_correlation(mut raw: Value) -> InboundFrame {
    let id = match raw.as_object_mut() {
        Some(map) => match map.remove(CORRELATION_FIELD) {
            Some(Value::String(id)) => Some(id),
            Some(_) | None => None,
        },
        None => None,
    };
    InboundFrame { id, payload: raw }
}

/// Extract a display-only label from an opaque payload.
///
/// Producers may set `"label"`; `"method"` is accepted for JSON-RPC-shaped
/// payloads. This is the only payload field the broker ever reads, and only
/// for history and event display.
pub fn request_label(payload: &Value) -> String {
    payload
        .get("label")
        .or_else(|| payload.get("method"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

/// Validate that a frame line is well-formed and carries a correlation id.
///
/// Convenience for call sites that require the id (the socket inbound path).
pub fn parse_response_frame(line: &str) -> Result<(String, Value)> {
    let frame = parse_frame(line)?;
    match frame.id {
        Some(id) => Ok((id, frame.payload)),
        None => Err(Error::FrameParse(format!(
            "Missing '{CORRELATION_FIELD}' field"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tagged_injects_correlation_field() {
        let env = Envelope {
            id: "abc-123".into(),
            payload: serde_json::json!({"label": "ping", "params": [1, 2]}),
        };
        let tagged = env.tagged();
        assert_eq!(tagged[CORRELATION_FIELD], "abc-123");
        assert_eq!(tagged["label"], "ping");
        assert_eq!(tagged["params"], serde_json::json!([1, 2]));
    }

    #[test]
    fn tagged_wraps_non_object_payload() {
        let env = Envelope {
            id: "abc-123".into(),
            payload: serde_json::json!([1, 2, 3]),
        };
        let tagged = env.tagged();
        assert_eq!(tagged[CORRELATION_FIELD], "abc-123");
        assert_eq!(tagged["payload"], serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn frame_round_trip_strips_correlation_field() {
        let env = Envelope::new(serde_json::json!({"label": "ping"}));
        let frame = env.to_frame().unwrap();
        let parsed = parse_frame(&frame).unwrap();
        assert_eq!(parsed.id.as_deref(), Some(env.id.as_str()));
        assert_eq!(parsed.payload, serde_json::json!({"label": "ping"}));
    }

    #[test]
    fn fresh_envelopes_get_distinct_ids() {
        let a = Envelope::new(Value::Null);
        let b = Envelope::new(Value::Null);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn parse_frame_without_id_yields_none() {
        let parsed = parse_frame(r#"{"result":"pong"}"#).unwrap();
        assert!(parsed.id.is_none());
        assert_eq!(parsed.payload, serde_json::json!({"result": "pong"}));
    }

    #[test]
    fn parse_frame_rejects_malformed_json() {
        assert!(parse_frame("{not json").is_err());
    }

    #[test]
    fn non_string_correlation_value_is_ignored() {
        let parsed = parse_frame(&format!(r#"{{"{CORRELATION_FIELD}": 42}}"#)).unwrap();
        assert!(parsed.id.is_none());
    }

    #[test]
    fn response_frame_requires_id() {
        assert!(parse_response_frame(r#"{"result":"pong"}"#).is_err());
        let (id, payload) =
            parse_response_frame(&format!(r#"{{"{CORRELATION_FIELD}":"x","result":"pong"}}"#))
                .unwrap();
        assert_eq!(id, "x");
        assert_eq!(payload, serde_json::json!({"result": "pong"}));
    }

    #[test]
    fn label_prefers_label_over_method() {
        assert_eq!(
            request_label(&serde_json::json!({"label": "a", "method": "b"})),
            "a"
        );
        assert_eq!(request_label(&serde_json::json!({"method": "b"})), "b");
        assert_eq!(request_label(&serde_json::json!({"params": []})), "unknown");
        assert_eq!(request_label(&serde_json::json!(null)), "unknown");
    }
}
