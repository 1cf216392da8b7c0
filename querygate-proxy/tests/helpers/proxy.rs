//! In-process querygate proxy for integration testing.

#![allow(dead_code)]

use prometheus_client::registry::Registry;
use querygate_core::reporter::{HttpMetricsSink, MetricsReporter};
use querygate_core::telemetry::GatewayMetrics;
use querygate_proxy::proxy_config::GatewayConfig;
use querygate_proxy::proxy_service::ProxyService;
use querygate_proxy::server;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// A running proxy. Stops accepting when dropped.
pub struct TestProxy {
    pub addr: SocketAddr,
    registry: Arc<Registry>,
    shutdown: CancellationToken,
}

impl TestProxy {
    /// Proxy in front of `origin_url`, reporting to `metrics_api_uri`.
    pub async fn start(origin_url: &str, metrics_api_uri: &str) -> Self {
        Self::start_with(GatewayConfig {
            origin_url: origin_url.to_string(),
            metrics_api_uri: metrics_api_uri.to_string(),
            ..GatewayConfig::default()
        })
        .await
    }

    pub async fn start_with(config: GatewayConfig) -> Self {
        let mut registry = Registry::default();
        let metrics = Arc::new(GatewayMetrics::new(&mut registry));

        let sink = HttpMetricsSink::new(&config.sink_config()).unwrap();
        let reporter = MetricsReporter::new(Arc::new(sink)).with_metrics(metrics.clone());
        let service = ProxyService::new(config, reporter)
            .unwrap()
            .with_metrics(metrics);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();

        let serve_shutdown = shutdown.clone();
        tokio::spawn(async move {
            server::serve(listener, service, serve_shutdown).await.unwrap();
        });

        Self {
            addr,
            registry: Arc::new(registry),
            shutdown,
        }
    }

    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self.addr, path_and_query)
    }

    /// OpenMetrics text of the proxy's counters.
    pub fn metrics_text(&self) -> String {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.registry).unwrap();
        buffer
    }

    /// Poll the counters until `needle` shows up or 5 seconds pass.
    pub async fn wait_for_metric(&self, needle: &str) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tokio::time::Instant::now() < deadline {
            if self.metrics_text().contains(needle) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// reqwest client with a bounded request timeout.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
