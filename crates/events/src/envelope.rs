//! Envelope for an inbound event.
//!
//! Every producer event carries the same outer fields; everything else —
//! the kind-specific body *and* any unknown envelope fields — is preserved
//! verbatim in a flattened map. Preserving unknowns matters twice over: DLQ
//! entries must hold the exact inbound payload for replay, and forward
//! compatibility requires that new producer fields survive a round trip
//! through the Core.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

use uprl_core::{ErrorKind, OrderId};

use crate::kind::{EventKind, SchemaVersion};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("event is not a JSON object")]
    NotAnObject,

    #[error("required envelope field '{0}' is missing")]
    MissingField(&'static str),

    #[error("envelope field '{field}' is malformed: {detail}")]
    MalformedField { field: &'static str, detail: String },

    #[error("unknown event_type '{0}'")]
    UnknownEventType(String),

    #[error("unknown schema_version '{0}'")]
    UnknownSchemaVersion(String),

    #[error("schema_version '{schema_version}' does not belong to event_type '{event_type}'")]
    KindMismatch {
        event_type: String,
        schema_version: String,
    },

    #[error("event body is malformed: {0}")]
    Body(String),
}

impl ParseError {
    pub fn body(detail: impl Into<String>) -> Self {
        ParseError::Body(detail.into())
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Parsed envelope of an inbound event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub event_id: Option<String>,
    pub kind: EventKind,
    /// The literal `event_type` string the producer sent (alias preserved).
    pub event_type_raw: String,
    pub schema_version: SchemaVersion,
    pub order_id: OrderId,
    pub emitted_at: DateTime<Utc>,
    pub emitter_service: Option<String>,
    pub idempotency_key: Option<String>,
    pub meta: Option<JsonValue>,
    /// Kind-specific body plus unknown envelope fields, verbatim.
    body: Map<String, JsonValue>,
}

/// Envelope fields consumed by `parse`; everything else stays in `body`.
const ENVELOPE_FIELDS: &[&str] = &[
    "event_id",
    "event_type",
    "schema_version",
    "order_id",
    "emitted_at",
    "emitter_service",
    "idempotency_key",
    "meta",
];

fn required_str<'a>(
    map: &'a Map<String, JsonValue>,
    field: &'static str,
) -> Result<&'a str, ParseError> {
    match map.get(field) {
        None | Some(JsonValue::Null) => Err(ParseError::MissingField(field)),
        Some(JsonValue::String(s)) if !s.is_empty() => Ok(s),
        Some(JsonValue::String(_)) => Err(ParseError::MissingField(field)),
        Some(other) => Err(ParseError::MalformedField {
            field,
            detail: format!("expected string, got {other}"),
        }),
    }
}

fn optional_str(map: &Map<String, JsonValue>, field: &'static str) -> Option<String> {
    match map.get(field) {
        Some(JsonValue::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Accept full RFC 3339 as well as naive ISO-8601 (interpreted as UTC) —
/// several producers emit timestamps without an offset.
fn parse_timestamp(field: &'static str, raw: &str) -> Result<DateTime<Utc>, ParseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    Err(ParseError::MalformedField {
        field,
        detail: format!("'{raw}' is not an ISO-8601 timestamp"),
    })
}

impl EventEnvelope {
    /// Parse the envelope out of a raw inbound payload.
    pub fn parse(raw: &JsonValue) -> Result<Self, ParseError> {
        let map = raw.as_object().ok_or(ParseError::NotAnObject)?;

        let event_type_raw = required_str(map, "event_type")?.to_string();
        let kind = EventKind::parse(&event_type_raw)?;

        let schema_version_raw = required_str(map, "schema_version")?;
        let schema_version = SchemaVersion::parse(schema_version_raw)?;
        if schema_version.kind() != kind {
            return Err(ParseError::KindMismatch {
                event_type: event_type_raw,
                schema_version: schema_version_raw.to_string(),
            });
        }

        let order_id = OrderId::new(required_str(map, "order_id")?);
        let emitted_at = parse_timestamp("emitted_at", required_str(map, "emitted_at")?)?;

        let mut body = Map::with_capacity(map.len());
        for (key, value) in map {
            if !ENVELOPE_FIELDS.contains(&key.as_str()) {
                body.insert(key.clone(), value.clone());
            }
        }

        Ok(Self {
            event_id: optional_str(map, "event_id"),
            kind,
            event_type_raw,
            schema_version,
            order_id,
            emitted_at,
            emitter_service: optional_str(map, "emitter_service"),
            idempotency_key: optional_str(map, "idempotency_key"),
            meta: map.get("meta").filter(|v| !v.is_null()).cloned(),
            body,
        })
    }

    /// Body fields (kind-specific plus preserved unknowns), verbatim.
    pub fn body(&self) -> &Map<String, JsonValue> {
        &self.body
    }

    /// Deserialize the body into a typed wire shape.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, ParseError> {
        serde_json::from_value(JsonValue::Object(self.body.clone()))
            .map_err(|e| ParseError::Body(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_pricing_event() -> JsonValue {
        json!({
            "event_type": "PricingUpdated",
            "schema_version": "pricing.commerce.v1",
            "order_id": "ORD-9001",
            "emitted_at": "2026-07-01T10:00:00Z",
            "components": []
        })
    }

    #[test]
    fn parses_a_minimal_envelope() {
        let env = EventEnvelope::parse(&minimal_pricing_event()).unwrap();
        assert_eq!(env.kind, EventKind::PricingUpdated);
        assert_eq!(env.order_id.as_str(), "ORD-9001");
        assert!(env.event_id.is_none());
        assert!(env.body().contains_key("components"));
    }

    #[test]
    fn missing_required_field_fails() {
        let mut raw = minimal_pricing_event();
        raw.as_object_mut().unwrap().remove("schema_version");
        assert_eq!(
            EventEnvelope::parse(&raw).unwrap_err(),
            ParseError::MissingField("schema_version")
        );
    }

    #[test]
    fn unknown_envelope_fields_are_preserved_in_body() {
        let mut raw = minimal_pricing_event();
        raw.as_object_mut()
            .unwrap()
            .insert("x_trace_id".to_string(), json!("abc-123"));
        let env = EventEnvelope::parse(&raw).unwrap();
        assert_eq!(env.body()["x_trace_id"], json!("abc-123"));
    }

    #[test]
    fn kind_schema_mismatch_is_rejected() {
        let raw = json!({
            "event_type": "PricingUpdated",
            "schema_version": "payment.timeline.v1",
            "order_id": "ORD-1",
            "emitted_at": "2026-07-01T10:00:00Z",
        });
        assert!(matches!(
            EventEnvelope::parse(&raw).unwrap_err(),
            ParseError::KindMismatch { .. }
        ));
    }

    #[test]
    fn naive_timestamps_are_read_as_utc() {
        let mut raw = minimal_pricing_event();
        raw.as_object_mut()
            .unwrap()
            .insert("emitted_at".to_string(), json!("2026-07-01T10:00:00.123456"));
        let env = EventEnvelope::parse(&raw).unwrap();
        assert_eq!(env.emitted_at.timezone(), Utc);
    }

    #[test]
    fn malformed_timestamp_is_rejected() {
        let mut raw = minimal_pricing_event();
        raw.as_object_mut()
            .unwrap()
            .insert("emitted_at".to_string(), json!("yesterday"));
        assert!(matches!(
            EventEnvelope::parse(&raw).unwrap_err(),
            ParseError::MalformedField { field: "emitted_at", .. }
        ));
    }
}
