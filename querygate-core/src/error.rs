//! Error types for envelope parsing and metrics reporting.

use thiserror::Error;

/// The origin answered with a body that is not a `{data, errors, extensions}`
/// JSON object.
#[derive(Error, Debug)]
#[error("origin response is not a GraphQL envelope: {0}")]
pub struct EnvelopeError(#[from] serde_json::Error);

/// Errors raised while posting a record to the metrics sink.
///
/// These never reach a client. The reporter logs them and moves on.
#[derive(Error, Debug)]
pub enum ReportError {
    /// Sink unreachable, connection reset, or request timed out.
    #[error("metrics sink transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Sink answered with anything other than 200.
    #[error("metrics sink returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code returned by the sink
        status: u16,
        /// Response body, truncated for logging
        body: String,
    },

    /// Sink client could not be constructed.
    #[error("invalid metrics sink configuration: {0}")]
    Config(String),
}

impl ReportError {
    /// Short machine-readable classification used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ReportError::Transport(e) if e.is_timeout() => "timeout",
            ReportError::Transport(e) if e.is_connect() => "connect",
            ReportError::Transport(_) => "transport",
            ReportError::UnexpectedStatus { .. } => "status",
            ReportError::Config(_) => "config",
        }
    }
}
