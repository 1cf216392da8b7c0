//! Instrumented relay for GraphQL traffic.
//!
//! The request and the origin response are buffered (bounded by
//! `max_body_bytes`). A successful origin envelope is split: `{data, errors}`
//! goes back to the client, `extensions` and `errors` go to the metrics sink
//! on a detached task. The client response never waits on the sink.
//!
//! ```text
//! RECEIVED ─► FORWARDED ─┬─► FAILED (status >= 400, relayed raw)
//!                        └─► PARSED ─► RESPONDED ─► METRICS_DISPATCHED
//! ```

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::{Request, Response, header};
use querygate_core::envelope::{MetricsRecord, OriginEnvelope, QueryEnvelope};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ProxyError, ProxyResult};
use crate::proxy_service::{
    ClientBody, ProxyService, UnifiedBody, map_hyper_error, strip_hop_by_hop_headers,
};
use crate::traffic::RouteKind;

impl ProxyService {
    /// Relay a GraphQL GET or POST, splitting telemetry off the response.
    ///
    /// # Errors
    ///
    /// - `PayloadTooLarge` when the POST body exceeds `max_body_bytes`
    /// - `UpstreamUnreachable` / `UpstreamTimeout` for origin transport faults
    /// - `UpstreamBody` when the origin body cannot be read or is too large
    /// - `EnvelopeParse` when a non-error origin body is not a JSON object
    pub async fn handle_instrumented_request(
        &self,
        req: Request<Incoming>,
    ) -> ProxyResult<Response<UnifiedBody>> {
        let target_uri = self.origin_uri(req.uri())?;
        let limit = self.config.max_body_bytes;

        let (mut parts, body) = req.into_parts();

        let (envelope, body_bytes) = if parts.method == Method::POST {
            let bytes = Limited::new(body, limit)
                .collect()
                .await
                .map_err(|e| {
                    if e.downcast_ref::<LengthLimitError>().is_some() {
                        ProxyError::PayloadTooLarge { limit }
                    } else {
                        ProxyError::BodyRead(e.to_string())
                    }
                })?
                .to_bytes();
            (QueryEnvelope::from_json_body(&bytes), bytes)
        } else {
            (QueryEnvelope::from_query_string(parts.uri.query()), Bytes::new())
        };

        info!(
            method = %parts.method,
            target = %target_uri,
            operation_name = envelope.operation_name.as_deref().unwrap_or(""),
            has_query = envelope.reportable_query().is_some(),
            "Relaying GraphQL request"
        );

        strip_hop_by_hop_headers(&mut parts.headers);
        parts.headers.remove(header::HOST);
        parts.headers.remove(header::CONTENT_LENGTH);
        // The origin body is parsed as JSON, so it must arrive uncompressed.
        parts.headers.remove(header::ACCEPT_ENCODING);

        let origin_body: ClientBody = Full::new(body_bytes).map_err(|e| match e {}).boxed();
        let mut origin_req = Request::new(origin_body);
        *origin_req.method_mut() = parts.method;
        *origin_req.uri_mut() = target_uri;
        *origin_req.headers_mut() = parts.headers;

        let started = Instant::now();
        let result = self
            .with_origin_timeout(async {
                let res = self
                    .client
                    .request(origin_req)
                    .await
                    .map_err(map_hyper_error)?;
                let (parts, body) = res.into_parts();
                let bytes = Limited::new(body, limit)
                    .collect()
                    .await
                    .map_err(|e| {
                        if e.downcast_ref::<LengthLimitError>().is_some() {
                            ProxyError::UpstreamBody(format!("response exceeds {} bytes", limit))
                        } else {
                            ProxyError::UpstreamBody(e.to_string())
                        }
                    })?
                    .to_bytes();
                Ok(Response::from_parts(parts, bytes))
            })
            .await;
        self.record_origin(RouteKind::Instrumented, &result, started);

        let (mut parts, bytes) = result?.into_parts();
        strip_hop_by_hop_headers(&mut parts.headers);
        parts.headers.remove(header::CONTENT_LENGTH);

        if parts.status.as_u16() >= 400 {
            debug!(status = parts.status.as_u16(), "Origin error relayed unchanged");
            return Ok(Response::from_parts(parts, full_body(bytes)));
        }

        let origin = OriginEnvelope::parse(&bytes).inspect_err(|e| {
            warn!(
                error = %e,
                status = parts.status.as_u16(),
                body_len = bytes.len(),
                "Origin response is not a GraphQL envelope"
            );
        })?;
        let (payload, telemetry) = origin.split();
        let client_bytes = payload
            .to_bytes()
            .map_err(|e| ProxyError::Internal(format!("Failed to encode response: {}", e)))?;

        match MetricsRecord::build(&envelope, telemetry) {
            Some(record) => {
                // Detached; the handle is dropped and the sink never delays the client.
                drop(self.reporter.dispatch(record));
            }
            None => self.reporter.skip(),
        }

        Ok(json_response(parts.status, parts.headers, client_bytes))
    }
}

fn full_body(bytes: Bytes) -> UnifiedBody {
    Full::new(bytes).map_err(|e| match e {}).boxed()
}

/// Client response carrying the split payload with the origin's status and
/// remaining headers.
fn json_response(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Response<UnifiedBody> {
    let mut res = Response::new(full_body(Bytes::from(body)));
    *res.status_mut() = status;
    *res.headers_mut() = headers;
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    res
}
