//! Fire-and-forget metrics reporting.
//!
//! After the client has been answered, the proxy hands a [`MetricsRecord`] to
//! the [`MetricsReporter`], which posts it to the sink on a detached task. The
//! request flow never awaits the post and never sees its outcome: failures are
//! logged at WARN and counted, nothing more. There is no retry.
//!
//! # Sink protocol
//!
//! One `POST {base}/metrics` per record with the record as the JSON body. Only
//! a `200 OK` counts as success; any other status, and any transport error,
//! is a failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, warn};

use crate::envelope::MetricsRecord;
use crate::error::ReportError;
use crate::telemetry::{DispatchOutcome, GatewayMetrics};

/// Longest sink response body kept in an error, in bytes.
const MAX_ERROR_BODY: usize = 512;

/// Configuration for the HTTP metrics sink client.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Base URL of the sink API (e.g., "http://localhost:8000/api/")
    pub base_url: String,
    /// Whole-request timeout; `None` waits indefinitely
    pub timeout: Option<Duration>,
    /// Refuse plain-HTTP sink URLs
    pub https_only: bool,
    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,
    /// Idle connection timeout
    pub pool_idle_timeout: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/".to_string(),
            timeout: Some(Duration::from_secs(10)),
            https_only: false,
            pool_max_idle_per_host: 8,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

impl SinkConfig {
    /// Create a config for `base_url` with default settings otherwise.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

/// Destination for metrics records.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Deliver one record. Resolves once the sink has answered.
    async fn submit(&self, record: &MetricsRecord) -> Result<(), ReportError>;
}

/// Metrics sink reached over HTTP with a pooled reqwest client.
#[derive(Clone)]
pub struct HttpMetricsSink {
    client: Client,
    /// Pre-computed `{base}/metrics` URL.
    metrics_url: String,
}

impl HttpMetricsSink {
    /// Build the sink client.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Config` if the base URL is empty or not an
    /// absolute URL, or if the HTTP client cannot be built.
    pub fn new(config: &SinkConfig) -> Result<Self, ReportError> {
        if config.base_url.is_empty() {
            return Err(ReportError::Config("sink base_url is empty".to_string()));
        }
        if let Err(e) = reqwest::Url::parse(&config.base_url) {
            return Err(ReportError::Config(format!(
                "invalid sink base_url '{}': {}",
                config.base_url, e
            )));
        }

        let mut builder = Client::builder()
            .https_only(config.https_only)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .tcp_nodelay(true);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ReportError::Config(format!("sink client build error: {}", e)))?;

        let metrics_url = format!("{}/metrics", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            metrics_url,
        })
    }

    /// The URL records are posted to.
    pub fn metrics_url(&self) -> &str {
        &self.metrics_url
    }
}

#[async_trait]
impl MetricsSink for HttpMetricsSink {
    async fn submit(&self, record: &MetricsRecord) -> Result<(), ReportError> {
        let response = self
            .client
            .post(&self.metrics_url)
            .json(record)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::OK {
            return Ok(());
        }

        let mut body = response.text().await.unwrap_or_default();
        truncate_at_char_boundary(&mut body, MAX_ERROR_BODY);
        Err(ReportError::UnexpectedStatus {
            status: status.as_u16(),
            body,
        })
    }
}

fn truncate_at_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

/// Dispatches metrics records on detached tasks.
///
/// Cheap to clone; every clone shares the same sink and counters.
#[derive(Clone)]
pub struct MetricsReporter {
    sink: Arc<dyn MetricsSink>,
    metrics: Option<Arc<GatewayMetrics>>,
}

impl MetricsReporter {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            sink,
            metrics: None,
        }
    }

    /// Count dispatch outcomes in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<GatewayMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Post `record` to the sink on a new task and return immediately.
    ///
    /// The returned handle exists for tests; the proxy drops it. The task
    /// never panics on sink failure.
    pub fn dispatch(&self, record: MetricsRecord) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        let metrics = self.metrics.clone();
        let span = info_span!(
            "metrics_dispatch",
            operation_name = record.operation_name.as_deref().unwrap_or("")
        );

        tokio::spawn(
            async move {
                let outcome = match sink.submit(&record).await {
                    Ok(()) => {
                        debug!("Metrics record delivered");
                        DispatchOutcome::Sent
                    }
                    Err(e) => {
                        let status = match &e {
                            ReportError::UnexpectedStatus { status, .. } => Some(*status),
                            _ => None,
                        };
                        warn!(
                            error = %e,
                            kind = e.kind(),
                            status = ?status,
                            "Failed to deliver metrics record"
                        );
                        DispatchOutcome::Failed
                    }
                };
                if let Some(metrics) = metrics {
                    metrics.record_dispatch(outcome);
                }
            }
            .instrument(span),
        )
    }

    /// Note a relayed request that carried no query.
    pub fn skip(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.record_dispatch(DispatchOutcome::Skipped);
        }
    }
}
