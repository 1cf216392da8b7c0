//! Core proxy service implementation.
//!
//! # Overview
//!
//! ProxyService is the entry point for all inbound HTTP traffic. It routes
//! each request by method and path:
//!
//! - **Instrumented** (GET/POST on the GraphQL path):
//!   - Buffered, forwarded, response split into client payload and telemetry
//!   - See [`crate::instrumented`]
//!
//! - **Passthrough** (everything else):
//!   - Zero-copy streaming to the origin and back
//!   - No inspection or buffering overhead
//!
//! # Request Flow
//!
//! ```text
//! Request<Incoming> ──► discriminate_route()
//!                              │
//!         ┌────────────────────┴────────────────────┐
//!         │                                         │
//!   RouteKind::Instrumented                 RouteKind::Passthrough
//!   (GET/POST on graphql_path)              (everything else)
//!         │                                         │
//!         ▼                                         ▼
//!   handle_instrumented_request()           handle_passthrough_request()
//!         │                                         │
//!   Buffer → split → report                 Zero-copy streaming
//! ```

use crate::error::{ProxyError, ProxyResult};
use crate::proxy_config::GatewayConfig;
use crate::traffic::{RouteKind, discriminate_route};
use bytes::Bytes;
use futures_util::StreamExt;
use http::{HeaderMap, HeaderName, Uri};
use http_body_util::{BodyExt, BodyStream, StreamBody};
use hyper::body::Incoming;
use hyper::{Request, Response, header};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use querygate_core::reporter::MetricsReporter;
use querygate_core::telemetry::GatewayMetrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tower::Service;
use tracing::{debug, info, warn};

/// Type alias for the origin client's request body type.
pub(crate) type ClientBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// Type alias for the unified response body type.
///
/// Instrumented responses use `Full<Bytes>` (buffered), passthrough responses
/// stream. Both are boxed for a unified return type.
pub type UnifiedBody = http_body_util::combinators::BoxBody<Bytes, ProxyError>;

/// Headers that describe a single connection and are never relayed.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Main proxy service relaying to a single origin over HTTP or HTTPS.
///
/// Cloning is cheap: the pooled client, configuration and reporter are shared.
#[derive(Clone)]
pub struct ProxyService {
    /// HTTPS-capable pooled client for origin connections.
    pub(crate) client: Client<HttpsConnector<HttpConnector>, ClientBody>,
    /// Origin base URL without trailing slash.
    origin_base: Arc<str>,
    /// Runtime configuration
    pub(crate) config: Arc<GatewayConfig>,
    /// Fire-and-forget metrics dispatch for instrumented responses.
    pub(crate) reporter: MetricsReporter,
    /// Optional prometheus-client counters
    pub(crate) metrics: Option<Arc<GatewayMetrics>>,
}

impl ProxyService {
    /// Create a proxy service for `config.origin_url`.
    ///
    /// In production mode the origin client refuses plain-HTTP connections.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::InvalidUri` if the origin URL is not an absolute
    /// http(s) URL, and `ProxyError::Internal` if the TLS stack cannot be set up.
    pub fn new(config: GatewayConfig, reporter: MetricsReporter) -> ProxyResult<Self> {
        let origin: Uri = config.origin_url.parse().map_err(|e| {
            ProxyError::InvalidUri(format!("invalid origin URL '{}': {}", config.origin_url, e))
        })?;
        if !matches!(origin.scheme_str(), Some("http" | "https")) || origin.host().is_none() {
            return Err(ProxyError::InvalidUri(format!(
                "origin URL must be absolute http(s): '{}'",
                config.origin_url
            )));
        }

        // Install default crypto provider for rustls exactly once.
        static RUSTLS_INIT: std::sync::OnceLock<Result<(), ()>> = std::sync::OnceLock::new();
        let init_result = RUSTLS_INIT.get_or_init(|| {
            // Another component may already have installed a provider.
            if rustls::crypto::CryptoProvider::get_default().is_some() {
                return Ok(());
            }
            rustls::crypto::ring::default_provider()
                .install_default()
                .map_err(|_| ())
        });
        if init_result.is_err() {
            return Err(ProxyError::Internal(
                "Failed to install rustls crypto provider".into(),
            ));
        }

        let mut http_connector = HttpConnector::new();
        http_connector.set_nodelay(config.tcp_nodelay);
        http_connector.enforce_http(false);

        let builder = HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| ProxyError::Internal(format!("Failed to load native TLS roots: {}", e)))?;
        let builder = if config.production {
            builder.https_only()
        } else {
            builder.https_or_http()
        };
        let https_connector = builder
            .enable_http1()
            .enable_http2()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new())
            .http2_keep_alive_while_idle(true)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .build(https_connector);

        let origin_base: Arc<str> = config.origin_url.trim_end_matches('/').into();

        Ok(Self {
            client,
            origin_base,
            config: Arc::new(config),
            reporter,
            metrics: None,
        })
    }

    /// Record request and origin counters in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<GatewayMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Get a reference to the proxy configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Handle an incoming request, routing it to the instrumented or
    /// passthrough relay.
    pub async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> ProxyResult<Response<UnifiedBody>> {
        let route = discriminate_route(&req, &self.config.graphql_path);
        if let Some(metrics) = &self.metrics {
            metrics.record_request(route.as_str());
        }

        match route {
            RouteKind::Instrumented => self.handle_instrumented_request(req).await,
            RouteKind::Passthrough => self.handle_passthrough_request(req).await,
        }
    }

    /// Relay a request with zero-copy streaming in both directions.
    pub async fn handle_passthrough_request(
        &self,
        req: Request<Incoming>,
    ) -> ProxyResult<Response<UnifiedBody>> {
        let target_uri = self.origin_uri(req.uri())?;

        info!(
            method = %req.method(),
            uri = %req.uri(),
            target = %target_uri,
            "Proxying request"
        );

        let (mut parts, incoming_body) = req.into_parts();
        strip_hop_by_hop_headers(&mut parts.headers);
        parts.headers.remove(header::HOST);

        // Convert Incoming body to zero-copy streaming body
        let body_stream = BodyStream::new(incoming_body);
        let mapped_stream = body_stream.map(|result| {
            result.map_err(|e| -> Box<dyn std::error::Error + Send + Sync> {
                Box::new(std::io::Error::other(format!("Body stream error: {}", e)))
            })
        });
        let boxed_body: ClientBody = BodyExt::boxed(StreamBody::new(mapped_stream));

        let mut origin_req = Request::new(boxed_body);
        *origin_req.method_mut() = parts.method;
        *origin_req.uri_mut() = target_uri;
        *origin_req.headers_mut() = parts.headers;

        let started = Instant::now();
        let result = self
            .with_origin_timeout(async {
                self.client
                    .request(origin_req)
                    .await
                    .map_err(map_hyper_error)
            })
            .await;
        self.record_origin(RouteKind::Passthrough, &result, started);
        let origin_res = result?;

        let (mut parts, body) = origin_res.into_parts();
        strip_hop_by_hop_headers(&mut parts.headers);

        let body_stream = BodyStream::new(body);
        let mapped_stream = body_stream.map(|result| {
            result.map_err(|e| ProxyError::UpstreamBody(format!("Body stream error: {}", e)))
        });
        let boxed_body: UnifiedBody = BodyExt::boxed(StreamBody::new(mapped_stream));

        Ok(Response::from_parts(parts, boxed_body))
    }

    /// Build the origin URI: origin base followed by the request's path and
    /// query, both verbatim.
    pub(crate) fn origin_uri(&self, uri: &Uri) -> ProxyResult<Uri> {
        let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let full_uri = format!("{}{}", self.origin_base, path);
        full_uri
            .parse()
            .map_err(|e| ProxyError::InvalidUri(format!("Failed to parse origin URI: {}", e)))
    }

    /// Run `fut` under the configured origin timeout.
    pub(crate) async fn with_origin_timeout<T, F>(&self, fut: F) -> ProxyResult<T>
    where
        F: Future<Output = ProxyResult<T>>,
    {
        match self.config.origin_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
                warn!(timeout_secs = limit.as_secs(), "Origin timeout");
                Err(ProxyError::UpstreamTimeout(format!(
                    "no response within {}s",
                    limit.as_secs()
                )))
            }),
            None => fut.await,
        }
    }

    /// Count one origin exchange by route and status.
    pub(crate) fn record_origin<B>(
        &self,
        route: RouteKind,
        result: &ProxyResult<Response<B>>,
        started: Instant,
    ) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        let status = match result {
            Ok(res) => res.status().as_u16().to_string(),
            Err(_) => "error".to_string(),
        };
        metrics.record_origin(
            route.as_str(),
            &status,
            started.elapsed().as_secs_f64() * 1000.0,
        );
    }
}

impl Service<Request<Incoming>> for ProxyService {
    type Response = Response<UnifiedBody>;
    type Error = ProxyError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { service.handle_request(req).await })
    }
}

/// Check if a header is a hop-by-hop header that shouldn't be forwarded.
pub fn is_hop_by_hop_header(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|hop| name.eq_ignore_ascii_case(hop))
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop_headers(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}

/// Map hyper_util client errors to appropriate ProxyError variants.
///
/// # Error Mapping
/// - Connect failures (refused, DNS, TLS handshake) -> `UpstreamUnreachable` (502)
/// - Timeout -> `UpstreamTimeout` (504)
/// - Other errors -> `UpstreamUnreachable` (502)
pub(crate) fn map_hyper_error(e: hyper_util::client::legacy::Error) -> ProxyError {
    if e.is_connect() {
        warn!(error = %e, "Origin connection failed");
        return ProxyError::UpstreamUnreachable(format!("Failed to connect to origin: {}", e));
    }

    let error_msg = e.to_string().to_lowercase();
    if error_msg.contains("timeout") || error_msg.contains("timed out") {
        warn!(error = %e, "Origin timeout");
        return ProxyError::UpstreamTimeout(format!("Origin timeout: {}", e));
    }

    debug!(error = ?e, "Origin error detail");
    warn!(error = %e, "Origin error");
    ProxyError::UpstreamUnreachable(format!("Origin error: {}", e))
}
