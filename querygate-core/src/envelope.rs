//! GraphQL request and response envelopes.
//!
//! Three shapes flow through the instrumented path:
//!
//! ```text
//! client ──► QueryEnvelope {query, operationName}        (read, never rewritten)
//! origin ──► OriginEnvelope {data, errors, extensions}
//!               ├──► ClientPayload {data, errors}        (to the client)
//!               └──► MetricsRecord {query, operationName, extensions, errors}
//! ```
//!
//! `data`, `errors` and `extensions` are opaque JSON values. The proxy never
//! looks inside them; it only moves them to the right side of the split.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EnvelopeError;
use crate::sanitize::sanitize_query;

/// The `query` and `operationName` carried by an inbound GraphQL request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryEnvelope {
    /// Raw query text as sent by the client.
    pub query: Option<String>,
    /// Optional operation name selecting one operation of a multi-operation document.
    pub operation_name: Option<String>,
}

impl QueryEnvelope {
    /// Read the envelope from a POST body.
    ///
    /// Bodies that are not JSON objects, and fields that are not strings, yield
    /// an empty envelope. The request itself is still forwarded unchanged.
    pub fn from_json_body(body: &[u8]) -> Self {
        let Ok(Value::Object(object)) = serde_json::from_slice::<Value>(body) else {
            return Self::default();
        };

        Self {
            query: string_field(&object, "query"),
            operation_name: string_field(&object, "operationName"),
        }
    }

    /// Read the envelope from a GET query string (without the leading `?`).
    ///
    /// When a parameter is repeated, the first occurrence wins.
    pub fn from_query_string(query_string: Option<&str>) -> Self {
        let mut envelope = Self::default();
        let Some(query_string) = query_string else {
            return envelope;
        };

        for (key, value) in url::form_urlencoded::parse(query_string.as_bytes()) {
            match key.as_ref() {
                "query" if envelope.query.is_none() => envelope.query = Some(value.into_owned()),
                "operationName" if envelope.operation_name.is_none() => {
                    envelope.operation_name = Some(value.into_owned())
                }
                _ => {}
            }
        }

        envelope
    }

    /// The query text if it is present and non-empty.
    pub fn reportable_query(&self) -> Option<&str> {
        self.query.as_deref().filter(|q| !q.is_empty())
    }
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_owned)
}

/// A successful origin response body: `{data, errors, extensions}`.
///
/// Each field is `None` when the key is absent and `Some(Value::Null)` when the
/// origin sent an explicit `null`, so the client sees exactly what the origin
/// produced for `data` and `errors`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OriginEnvelope {
    pub data: Option<Value>,
    pub errors: Option<Value>,
    pub extensions: Option<Value>,
}

impl OriginEnvelope {
    /// Parse an origin body. Anything other than a JSON object is an error.
    ///
    /// Unknown top-level keys are dropped.
    pub fn parse(body: &[u8]) -> Result<Self, EnvelopeError> {
        let mut object: Map<String, Value> = serde_json::from_slice(body)?;

        Ok(Self {
            data: object.remove("data"),
            errors: object.remove("errors"),
            extensions: object.remove("extensions"),
        })
    }

    /// Split into the client-facing payload and the telemetry half.
    ///
    /// `errors` goes to both sides; `extensions` only to the telemetry side.
    pub fn split(self) -> (ClientPayload, Telemetry) {
        let client = ClientPayload {
            data: self.data,
            errors: self.errors.clone(),
        };
        let telemetry = Telemetry {
            extensions: self.extensions,
            errors: self.errors,
        };
        (client, telemetry)
    }
}

/// Body returned to the client on the instrumented path.
///
/// Has no `extensions` field, so telemetry cannot leak by construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
}

impl ClientPayload {
    /// Serialize to the bytes written to the client.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// The telemetry half of an origin envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telemetry {
    pub extensions: Option<Value>,
    pub errors: Option<Value>,
}

/// The record posted to the metrics sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsRecord {
    /// Sanitized query text.
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
}

impl MetricsRecord {
    /// Build a record for a relayed request, sanitizing the query text.
    ///
    /// Returns `None` when the request carried no query or an empty one; such
    /// requests are never reported.
    pub fn build(request: &QueryEnvelope, telemetry: Telemetry) -> Option<Self> {
        let query = request.reportable_query()?;

        Some(Self {
            query: sanitize_query(query),
            operation_name: request.operation_name.clone(),
            extensions: telemetry.extensions,
            errors: telemetry.errors,
        })
    }
}
