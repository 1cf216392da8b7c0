//! Centralized configuration for the querygate proxy.
//!
//! One [`GatewayConfig`] is built at startup and handed to the proxy service.
//! Relay code never reads the environment itself.

use std::time::Duration;

use querygate_core::reporter::SinkConfig;
use tracing::warn;

/// Default origin base URL.
pub const DEFAULT_ORIGIN_URL: &str = "http://localhost:5000/";

/// Default metrics sink base URL.
pub const DEFAULT_METRICS_API_URI: &str = "http://localhost:8000/api/";

/// Default path of the instrumented GraphQL endpoint.
pub const DEFAULT_GRAPHQL_PATH: &str = "/graphql";

/// Runtime configuration for the querygate proxy.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    // ─────────────────────────────────────────────────────────────────────────
    // Endpoints
    // ─────────────────────────────────────────────────────────────────────────
    /// Origin base URL; request paths are appended to it
    pub origin_url: String,

    /// Metrics sink base URL; records go to `{metrics_api_uri}/metrics`
    pub metrics_api_uri: String,

    /// Exact path whose GET/POST traffic is instrumented
    pub graphql_path: String,

    /// Secure outbound transport: HTTPS only towards origin and sink
    pub production: bool,

    // ─────────────────────────────────────────────────────────────────────────
    // Timeouts and limits
    // ─────────────────────────────────────────────────────────────────────────
    /// Origin response timeout; `None` waits indefinitely
    pub origin_timeout: Option<Duration>,

    /// Metrics sink request timeout; `None` waits indefinitely
    pub sink_timeout: Option<Duration>,

    /// Maximum buffered body size on the instrumented path, both directions
    pub max_body_bytes: usize,

    // ─────────────────────────────────────────────────────────────────────────
    // Connections
    // ─────────────────────────────────────────────────────────────────────────
    /// Enable TCP_NODELAY on inbound and origin connections
    pub tcp_nodelay: bool,

    /// TCP keepalive interval for accepted connections, in seconds
    pub tcp_keepalive_secs: u64,

    /// Maximum idle pooled connections per host
    pub pool_max_idle_per_host: usize,

    /// Idle pooled connection timeout
    pub pool_idle_timeout: Duration,

    /// Admin server port (`/health`, `/metrics`)
    pub admin_port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            origin_url: DEFAULT_ORIGIN_URL.to_string(),
            metrics_api_uri: DEFAULT_METRICS_API_URI.to_string(),
            graphql_path: DEFAULT_GRAPHQL_PATH.to_string(),
            production: false,
            origin_timeout: Some(Duration::from_secs(30)),
            sink_timeout: Some(Duration::from_secs(10)),
            max_body_bytes: 10 * 1024 * 1024, // 10 MiB
            tcp_nodelay: true,
            tcp_keepalive_secs: 60,
            pool_max_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
            admin_port: 4001,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// # Environment Variables
    ///
    /// - `ORIGIN_URL` (default: `http://localhost:5000/`)
    /// - `METRICS_API_URI` (default: `http://localhost:8000/api/`)
    /// - `QUERYGATE_GRAPHQL_PATH` (default: `/graphql`)
    /// - `NODE_ENV` or `QUERYGATE_ENV` equal to `production` selects HTTPS-only
    ///   outbound transport
    /// - `QUERYGATE_ORIGIN_TIMEOUT_SECS` (default: 30, `0` disables)
    /// - `QUERYGATE_SINK_TIMEOUT_SECS` (default: 10, `0` disables)
    /// - `QUERYGATE_MAX_BODY_BYTES` (default: 10485760)
    /// - `QUERYGATE_TCP_NODELAY` (default: true)
    /// - `QUERYGATE_TCP_KEEPALIVE_SECS` (default: 60)
    /// - `QUERYGATE_POOL_MAX_IDLE` (default: 32)
    /// - `QUERYGATE_POOL_IDLE_TIMEOUT_SECS` (default: 90)
    /// - `QUERYGATE_ADMIN_PORT` (default: 4001)
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            origin_url: env_string("ORIGIN_URL", default.origin_url),
            metrics_api_uri: env_string("METRICS_API_URI", default.metrics_api_uri),
            graphql_path: env_string("QUERYGATE_GRAPHQL_PATH", default.graphql_path),
            production: is_production_env(),

            origin_timeout: optional_timeout(parse_env_warn(
                "QUERYGATE_ORIGIN_TIMEOUT_SECS",
                secs_or_zero(default.origin_timeout),
            )),

            sink_timeout: optional_timeout(parse_env_warn(
                "QUERYGATE_SINK_TIMEOUT_SECS",
                secs_or_zero(default.sink_timeout),
            )),

            max_body_bytes: parse_env_warn("QUERYGATE_MAX_BODY_BYTES", default.max_body_bytes),

            tcp_nodelay: parse_env_warn("QUERYGATE_TCP_NODELAY", default.tcp_nodelay),

            tcp_keepalive_secs: parse_env_warn(
                "QUERYGATE_TCP_KEEPALIVE_SECS",
                default.tcp_keepalive_secs,
            ),

            pool_max_idle_per_host: parse_env_warn(
                "QUERYGATE_POOL_MAX_IDLE",
                default.pool_max_idle_per_host,
            ),

            pool_idle_timeout: Duration::from_secs(parse_env_warn(
                "QUERYGATE_POOL_IDLE_TIMEOUT_SECS",
                default.pool_idle_timeout.as_secs(),
            )),

            admin_port: parse_env_warn("QUERYGATE_ADMIN_PORT", default.admin_port),
        }
    }

    /// Settings for the metrics sink client.
    pub fn sink_config(&self) -> SinkConfig {
        SinkConfig {
            base_url: self.metrics_api_uri.clone(),
            timeout: self.sink_timeout,
            https_only: self.production,
            pool_max_idle_per_host: self.pool_max_idle_per_host,
            pool_idle_timeout: self.pool_idle_timeout,
        }
    }
}

/// True when `NODE_ENV` or `QUERYGATE_ENV` is `production`.
pub fn is_production_env() -> bool {
    ["NODE_ENV", "QUERYGATE_ENV"]
        .iter()
        .any(|name| std::env::var(name).is_ok_and(|v| v.eq_ignore_ascii_case("production")))
}

fn env_string(name: &str, default: String) -> String {
    match std::env::var(name) {
        Ok(val) if !val.trim().is_empty() => val,
        _ => default,
    }
}

fn optional_timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn secs_or_zero(timeout: Option<Duration>) -> u64 {
    timeout.map(|d| d.as_secs()).unwrap_or(0)
}

/// Parse an environment variable with a warning on invalid values.
///
/// If the env var is set but cannot be parsed, logs a warning and returns the default.
/// If the env var is not set, returns the default silently.
fn parse_env_warn<T: std::str::FromStr + std::fmt::Display>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(val) => match val.parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(
                    env_var = name,
                    value = %val,
                    default = %default,
                    "Invalid value for environment variable, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}
