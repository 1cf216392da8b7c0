//! querygate core: GraphQL envelope handling and metrics reporting.
//!
//! This library holds everything the proxy knows about the GraphQL payloads
//! it relays, independent of the HTTP transport:
//!
//! - [`envelope`]: the `{query, operationName}` request envelope, the
//!   `{data, errors, extensions}` origin envelope and the split into a client
//!   payload and a [`envelope::MetricsRecord`].
//! - [`sanitize`]: literal redaction and whitespace normalization applied to
//!   query text before it leaves the process.
//! - [`reporter`]: the fire-and-forget metrics reporter and its HTTP sink.
//! - [`telemetry`]: Prometheus counters shared by the proxy and the reporter.

pub mod envelope;
pub mod error;
pub mod reporter;
pub mod sanitize;
pub mod telemetry;
