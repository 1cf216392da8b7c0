//! Route discrimination for inbound requests.
//!
//! Two routes exist:
//!
//! 1. **Instrumented** - GET or POST on the configured GraphQL path
//!    - Request and origin response are buffered
//!    - `extensions` is split off the response and reported to the sink
//!
//! 2. **Passthrough** - everything else
//!    - Streamed to and from the origin untouched
//!    - No parsing, no buffering
//!
//! The check looks at method and path only. It never reads the body and never
//! inspects `Content-Type`: a POST with any body on the GraphQL path is
//! instrumented, and a malformed body simply carries no query.

use hyper::{Method, Request};

/// Route taken by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// GraphQL traffic: buffered, split and measured.
    Instrumented,

    /// Any other traffic: zero-copy streaming to the origin.
    Passthrough,
}

impl RouteKind {
    /// Label used in logs and counters.
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteKind::Instrumented => "instrumented",
            RouteKind::Passthrough => "passthrough",
        }
    }
}

/// Pick the route for `req`.
///
/// The path must equal `graphql_path` exactly: no trailing-slash or
/// double-slash normalization, and the query string is ignored.
///
/// # Example
///
/// ```rust
/// use hyper::{Method, Request};
/// use querygate_proxy::traffic::{RouteKind, discriminate_route};
///
/// let req = Request::builder()
///     .method(Method::GET)
///     .uri("/graphql?query=%7Bhero%7D")
///     .body(())
///     .unwrap();
/// assert_eq!(discriminate_route(&req, "/graphql"), RouteKind::Instrumented);
///
/// let req = Request::builder()
///     .method(Method::GET)
///     .uri("/graphiql")
///     .body(())
///     .unwrap();
/// assert_eq!(discriminate_route(&req, "/graphql"), RouteKind::Passthrough);
/// ```
pub fn discriminate_route<B>(req: &Request<B>, graphql_path: &str) -> RouteKind {
    if req.uri().path() != graphql_path {
        return RouteKind::Passthrough;
    }

    match *req.method() {
        Method::GET | Method::POST => RouteKind::Instrumented,
        _ => RouteKind::Passthrough,
    }
}
