//! Access logging for the gateway.
//!
//! `tower_http::trace::TraceLayer` does the plumbing. Each exchange gets a span
//! carrying a correlation ID; headers only show up at DEBUG, with credentials
//! masked.

use http::{HeaderMap, HeaderName, HeaderValue};
use std::fmt;
use std::time::Duration;
use tower_http::classify::{ServerErrorsAsFailures, ServerErrorsFailureClass, SharedClassifier};
use tower_http::trace::{
    DefaultOnBodyChunk, DefaultOnEos, MakeSpan, OnFailure, OnRequest, OnResponse, TraceLayer,
};
use tracing::{Span, debug, info, warn};

/// Header names (lowercase, as `HeaderName` stores them) whose values are masked.
const MASKED_HEADERS: &[&str] = &["authorization", "proxy-authorization", "cookie", "set-cookie"];

pub type AccessLogLayer = TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    ExchangeSpan,
    LogInbound,
    LogOutbound,
    DefaultOnBodyChunk,
    DefaultOnEos,
    LogServerError,
>;

pub fn logging_layer() -> AccessLogLayer {
    TraceLayer::new_for_http()
        .make_span_with(ExchangeSpan)
        .on_request(LogInbound)
        .on_response(LogOutbound)
        .on_failure(LogServerError)
}

/// One `exchange` span per client request, keyed by `request_id`.
#[derive(Clone, Copy, Debug)]
pub struct ExchangeSpan;

impl<B> MakeSpan<B> for ExchangeSpan {
    fn make_span(&mut self, request: &hyper::Request<B>) -> Span {
        tracing::info_span!(
            "exchange",
            request_id = %request_id(request.headers()),
            method = %request.method(),
            path = request.uri().path(),
        )
    }
}

/// The client's `x-request-id`, or a fresh UUID when it sent none.
fn request_id(headers: &HeaderMap) -> String {
    match headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
        Some(id) if !id.is_empty() => id.to_owned(),
        _ => uuid::Uuid::new_v4().to_string(),
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LogInbound;

impl<B> OnRequest<B> for LogInbound {
    fn on_request(&mut self, request: &hyper::Request<B>, _span: &Span) {
        debug!(
            query = request.uri().query().unwrap_or(""),
            headers = ?MaskedHeaders(request.headers()),
            "Client request"
        );
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LogOutbound;

impl<B> OnResponse<B> for LogOutbound {
    fn on_response(self, response: &hyper::Response<B>, latency: Duration, _span: &Span) {
        info!(
            status = response.status().as_u16(),
            elapsed_ms = latency.as_millis(),
            "Exchange complete"
        );
        debug!(headers = ?MaskedHeaders(response.headers()), "Client response headers");
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LogServerError;

impl OnFailure<ServerErrorsFailureClass> for LogServerError {
    fn on_failure(&mut self, class: ServerErrorsFailureClass, latency: Duration, _span: &Span) {
        warn!(%class, elapsed_ms = latency.as_millis(), "Exchange failed");
    }
}

/// Debug view of a header map with credential values masked.
struct MaskedHeaders<'a>(&'a HeaderMap);

impl fmt::Debug for MaskedHeaders<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|(name, value)| (name.as_str(), shown_value(name, value))))
            .finish()
    }
}

fn shown_value<'a>(name: &HeaderName, value: &'a HeaderValue) -> &'a str {
    if MASKED_HEADERS.contains(&name.as_str()) {
        "***"
    } else {
        value.to_str().unwrap_or("<non-ascii>")
    }
}
