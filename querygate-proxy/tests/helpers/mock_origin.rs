//! Mock origin server for integration testing.
//!
//! Answers every method on every path with one preconfigured response and
//! records each request it receives.

#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::Response,
};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::Value;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// A request as seen by the origin.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: Method,
    /// Path and query, verbatim
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Mock origin builder.
#[derive(Debug, Clone)]
pub struct MockOrigin {
    status: u16,
    body: Bytes,
    headers: Vec<(String, String)>,
    delay: Option<Duration>,
    gzip: bool,
}

#[derive(Debug)]
struct MockState {
    status: u16,
    body: Bytes,
    headers: Vec<(String, String)>,
    delay: Option<Duration>,
    gzip: bool,
    requests: RwLock<Vec<CapturedRequest>>,
}

impl MockOrigin {
    /// A 200 origin with an empty body.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: 200,
            body: Bytes::new(),
            headers: Vec::new(),
            delay: None,
            gzip: false,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Bytes::from(body.into());
        self
    }

    /// JSON body with a matching content type.
    #[must_use]
    pub fn with_json(self, body: Value) -> Self {
        self.with_header("content-type", "application/json")
            .with_body(body.to_string())
    }

    /// Add a response header. Repeated names produce repeated header lines.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Gzip the body whenever the request's `accept-encoding` allows it.
    #[must_use]
    pub fn with_gzip(mut self) -> Self {
        self.gzip = true;
        self
    }

    /// Start the mock server and return its address and handle.
    pub async fn start(self) -> (SocketAddr, MockOriginHandle) {
        let state = Arc::new(MockState {
            status: self.status,
            body: self.body,
            headers: self.headers,
            delay: self.delay,
            gzip: self.gzip,
            requests: RwLock::new(Vec::new()),
        });

        let app = Router::new()
            .fallback(handle_any)
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (
            addr,
            MockOriginHandle {
                state,
                _handle: handle,
            },
        )
    }
}

impl Default for MockOrigin {
    fn default() -> Self {
        Self::new()
    }
}

async fn handle_any(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let accepts_gzip = headers
        .get_all("accept-encoding")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("gzip"));

    state.requests.write().await.push(CapturedRequest {
        method,
        uri: uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_default(),
        headers,
        body,
    });

    if let Some(delay) = state.delay {
        tokio::time::sleep(delay).await;
    }

    let compress = state.gzip && accepts_gzip;
    let body = if compress {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&state.body).unwrap();
        Bytes::from(encoder.finish().unwrap())
    } else {
        state.body.clone()
    };

    let mut res = Response::new(Body::from(body));
    *res.status_mut() = StatusCode::from_u16(state.status).unwrap();
    if compress {
        res.headers_mut()
            .insert("content-encoding", HeaderValue::from_static("gzip"));
    }
    for (name, value) in &state.headers {
        res.headers_mut().append(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    res
}

/// Handle to the running mock origin.
pub struct MockOriginHandle {
    state: Arc<MockState>,
    _handle: JoinHandle<()>,
}

impl MockOriginHandle {
    pub async fn request_count(&self) -> usize {
        self.state.requests.read().await.len()
    }

    pub async fn requests(&self) -> Vec<CapturedRequest> {
        self.state.requests.read().await.clone()
    }

    /// The most recent request; panics if none arrived.
    pub async fn last_request(&self) -> CapturedRequest {
        self.state
            .requests
            .read()
            .await
            .last()
            .cloned()
            .expect("origin received no request")
    }
}

/// URL of a port with nothing listening on it.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/", addr)
}
