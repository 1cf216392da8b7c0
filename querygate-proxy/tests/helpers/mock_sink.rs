//! Mock metrics sink for integration testing.
//!
//! Serves `POST /api/metrics` and records every JSON body it receives.

#![allow(dead_code)]

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

#[derive(Debug)]
struct SinkState {
    status: StatusCode,
    records: RwLock<Vec<Value>>,
}

/// Handle to a running mock sink.
pub struct MockSink {
    addr: SocketAddr,
    state: Arc<SinkState>,
    _handle: JoinHandle<()>,
}

impl MockSink {
    /// A sink that accepts every record with 200.
    pub async fn start() -> Self {
        Self::start_with_status(StatusCode::OK).await
    }

    /// A sink that records bodies but answers with `status`.
    pub async fn start_with_status(status: StatusCode) -> Self {
        let state = Arc::new(SinkState {
            status,
            records: RwLock::new(Vec::new()),
        });

        let app = Router::new()
            .route("/api/metrics", post(record))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            _handle: handle,
        }
    }

    /// Base URL to configure as `METRICS_API_URI`.
    pub fn base_url(&self) -> String {
        format!("http://{}/api/", self.addr)
    }

    pub async fn records(&self) -> Vec<Value> {
        self.state.records.read().await.clone()
    }

    /// Poll until at least `count` records arrived or 5 seconds pass.
    pub async fn wait_for_records(&self, count: usize) -> Vec<Value> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let records = self.records().await;
            if records.len() >= count || tokio::time::Instant::now() >= deadline {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait long enough for a detached dispatch to have landed, then return
    /// everything recorded.
    pub async fn settle(&self) -> Vec<Value> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        self.records().await
    }
}

async fn record(State(state): State<Arc<SinkState>>, Json(body): Json<Value>) -> StatusCode {
    state.records.write().await.push(body);
    state.status
}
