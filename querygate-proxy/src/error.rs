//! Error types for the querygate HTTP proxy layer.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode, header};
use querygate_core::error::EnvelopeError;
use thiserror::Error;

/// Errors that can occur while relaying a request.
///
/// Each variant maps to a fixed status in [`ProxyError::to_response`]. An
/// origin that answers with a 4xx/5xx is not an error here; that response is
/// relayed as-is.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Origin URL could not be built from the configured base and request path
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Origin unreachable: refused, DNS failure, reset (maps to 502 Bad Gateway)
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Origin did not answer within the configured timeout (maps to 504)
    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// Origin response body could not be read or exceeded the buffer limit (502)
    #[error("Upstream body error: {0}")]
    UpstreamBody(String),

    /// Origin answered 2xx/3xx with a body that is not a GraphQL envelope (502)
    #[error(transparent)]
    EnvelopeParse(#[from] EnvelopeError),

    /// Client request body could not be read (maps to 400)
    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    /// Instrumented request body exceeded the buffer limit (maps to 413)
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Response or request could not be assembled (maps to 500)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// HTTP status code this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidUri(_) | ProxyError::BodyRead(_) => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamUnreachable(_)
            | ProxyError::UpstreamBody(_)
            | ProxyError::EnvelopeParse(_) => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert error to HTTP response with appropriate status code.
    ///
    /// Envelope failures answer in GraphQL shape so GraphQL clients can
    /// surface them; transport failures answer in plain text.
    pub fn to_response(&self) -> Response<Full<Bytes>> {
        let status = self.status();
        let (content_type, body) = match self {
            ProxyError::EnvelopeParse(e) => (
                "application/json",
                serde_json::json!({ "errors": [{ "message": e.to_string() }] }).to_string(),
            ),
            ProxyError::UpstreamUnreachable(_) => (
                "text/plain",
                "502 Bad Gateway\n\nFailed to connect to origin server.".to_string(),
            ),
            ProxyError::UpstreamBody(_) => (
                "text/plain",
                "502 Bad Gateway\n\nOrigin response could not be read.".to_string(),
            ),
            ProxyError::UpstreamTimeout(_) => (
                "text/plain",
                "504 Gateway Timeout\n\nOrigin server did not respond in time.".to_string(),
            ),
            ProxyError::InvalidUri(_) => (
                "text/plain",
                "400 Bad Request\n\nInvalid request URI.".to_string(),
            ),
            ProxyError::BodyRead(_) => (
                "text/plain",
                "400 Bad Request\n\nRequest body could not be read.".to_string(),
            ),
            ProxyError::PayloadTooLarge { limit } => (
                "text/plain",
                format!("413 Payload Too Large\n\nRequest body exceeds {} bytes.", limit),
            ),
            ProxyError::Internal(_) => (
                "text/plain",
                "500 Internal Server Error".to_string(),
            ),
        };

        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, content_type)
            .body(Full::new(Bytes::from(body)))
            .unwrap_or_else(|_| {
                let mut resp = Response::new(Full::new(Bytes::from("500 Internal Server Error")));
                *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                resp
            })
    }
}

/// Result type alias for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;
