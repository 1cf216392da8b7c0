//! querygate - GraphQL reverse proxy that reports origin telemetry to a
//! metrics sink.
//!
//! All traffic on the listen port is relayed to one origin. GraphQL requests
//! have the origin's `extensions` block stripped from the response and posted,
//! with the sanitized query, to `{METRICS_API_URI}/metrics`.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use clap::Parser;
use querygate_core::reporter::{HttpMetricsSink, MetricsReporter};
use querygate_core::telemetry::GatewayMetrics;
use querygate_proxy::admin::{AdminServer, AdminServerConfig};
use querygate_proxy::proxy_config::GatewayConfig;
use querygate_proxy::proxy_service::ProxyService;
use querygate_proxy::server;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Command-line options. Each falls back to its environment variable, then
/// to the built-in default.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Listen port for proxied traffic
    #[arg(short, long, env = "PORT", default_value_t = 4000)]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Origin base URL (default: http://localhost:5000/)
    #[arg(long, env = "ORIGIN_URL")]
    origin_url: Option<String>,

    /// Metrics sink base URL (default: http://localhost:8000/api/)
    #[arg(long, env = "METRICS_API_URI")]
    metrics_api_uri: Option<String>,

    /// Path whose GET/POST traffic is instrumented (default: /graphql)
    #[arg(long, env = "QUERYGATE_GRAPHQL_PATH")]
    graphql_path: Option<String>,

    /// Require HTTPS towards origin and sink. Also enabled by
    /// NODE_ENV=production or QUERYGATE_ENV=production.
    #[arg(long)]
    production: bool,
}

impl Cli {
    /// Overlay command-line values on the environment-derived config.
    fn apply(self, mut config: GatewayConfig) -> GatewayConfig {
        if let Some(origin_url) = self.origin_url {
            config.origin_url = origin_url;
        }
        if let Some(metrics_api_uri) = self.metrics_api_uri {
            config.metrics_api_uri = metrics_api_uri;
        }
        if let Some(graphql_path) = self.graphql_path {
            config.graphql_path = graphql_path;
        }
        config.production |= self.production;
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The guard must live for the whole program so buffered logs are flushed.
    let (non_blocking, _guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .json()
        .with_writer(non_blocking)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let listen_addr = format!("{}:{}", cli.bind, cli.port);
    let config = cli.apply(GatewayConfig::from_env());

    if config.production {
        for (name, url) in [
            ("origin", &config.origin_url),
            ("metrics sink", &config.metrics_api_uri),
        ] {
            if !url.starts_with("https://") {
                warn!(
                    target_name = name,
                    url = %url,
                    "Production mode only allows HTTPS; requests to this endpoint will fail"
                );
            }
        }
    }

    let mut prom_registry = prometheus_client::registry::Registry::default();
    let metrics = Arc::new(GatewayMetrics::new(&mut prom_registry));
    let prom_registry = Arc::new(prom_registry);

    let sink = HttpMetricsSink::new(&config.sink_config())?;
    info!(metrics_url = %sink.metrics_url(), "Metrics sink configured");
    let reporter = MetricsReporter::new(Arc::new(sink)).with_metrics(metrics.clone());

    let admin_port = config.admin_port;
    let proxy_service = ProxyService::new(config, reporter)?.with_metrics(metrics);

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    let admin = AdminServer::new(prom_registry, AdminServerConfig::with_port(admin_port));
    let admin_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = admin.run(admin_shutdown).await {
            error!(error = %e, "Admin server error");
        }
    });

    let listener = TcpListener::bind(&listen_addr).await?;
    let config = proxy_service.config();
    info!(
        addr = %listen_addr,
        origin = %config.origin_url,
        graphql_path = %config.graphql_path,
        production = config.production,
        origin_timeout_secs = config.origin_timeout.map(|d| d.as_secs()),
        max_body_bytes = config.max_body_bytes,
        "querygate starting"
    );

    server::serve(listener, proxy_service, shutdown).await?;

    // No drain: in-flight requests and pending metrics posts are abandoned.
    info!("querygate stopped");
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_sigint = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT (Ctrl+C), exiting");
                shutdown_sigint.cancel();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGINT");
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, exiting");
                shutdown.cancel();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
            }
        }
    });

    #[cfg(not(unix))]
    let _ = shutdown;
}
