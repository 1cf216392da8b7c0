//! Mock GraphQL origin for exercising the querygate proxy locally.
//!
//! Answers every query with a canned result plus an Apollo-tracing-shaped
//! `extensions` block, which is what the proxy strips and reports.
//!
//! # Environment Variables
//!
//! - `MOCK_ORIGIN_PORT`: Listen port (default: 5000)
//! - `MOCK_ORIGIN_DELAY_MS`: Response delay in milliseconds (default: 0)
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin mock_origin
//! cargo run --bin querygate
//!
//! curl -X POST http://localhost:4000/graphql \
//!   -H "Content-Type: application/json" \
//!   -d '{"query":"query Hero { hero(id: 2001) { name } }","operationName":"Hero"}'
//! ```

use axum::{
    Json, Router,
    body::Bytes,
    extract::RawQuery,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use querygate_core::envelope::QueryEnvelope;
use serde_json::json;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::time::sleep;

const GRAPHIQL_PAGE: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <title>GraphiQL</title>
    <link rel="stylesheet" href="https://unpkg.com/graphiql/graphiql.min.css" />
  </head>
  <body style="margin: 0;">
    <div id="graphiql" style="height: 100vh;"></div>
    <script crossorigin src="https://unpkg.com/react/umd/react.production.min.js"></script>
    <script crossorigin src="https://unpkg.com/react-dom/umd/react-dom.production.min.js"></script>
    <script crossorigin src="https://unpkg.com/graphiql/graphiql.min.js"></script>
    <script>
      const fetcher = GraphiQL.createFetcher({ url: '/graphql' });
      ReactDOM.render(React.createElement(GraphiQL, { fetcher }), document.getElementById('graphiql'));
    </script>
  </body>
</html>
"#;

async fn graphql_get(RawQuery(query): RawQuery) -> Response {
    execute(QueryEnvelope::from_query_string(query.as_deref())).await
}

async fn graphql_post(body: Bytes) -> Response {
    execute(QueryEnvelope::from_json_body(&body)).await
}

/// Produce a mock result for `envelope`.
async fn execute(envelope: QueryEnvelope) -> Response {
    let started = Instant::now();

    let Some(query) = envelope.reportable_query() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "errors": [{ "message": "Must provide query string." }] })),
        )
            .into_response();
    };

    let delay_ms: u64 = std::env::var("MOCK_ORIGIN_DELAY_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    if delay_ms > 0 {
        sleep(Duration::from_millis(delay_ms)).await;
    }

    let duration_ns = started.elapsed().as_nanos() as u64;
    Json(json!({
        "data": {
            "hero": { "name": "R2-D2", "id": "2001" },
            "operationName": envelope.operation_name,
            "queryLength": query.len(),
        },
        "extensions": {
            "tracing": {
                "version": 1,
                "duration": duration_ns,
                "execution": {
                    "resolvers": [{
                        "path": ["hero"],
                        "parentType": "Query",
                        "fieldName": "hero",
                        "returnType": "Character",
                        "startOffset": 0,
                        "duration": duration_ns,
                    }]
                }
            }
        }
    }))
    .into_response()
}

async fn graphiql() -> Html<&'static str> {
    Html(GRAPHIQL_PAGE)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let port: u16 = std::env::var("MOCK_ORIGIN_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5000);

    let app = Router::new()
        .route("/graphql", get(graphql_get).post(graphql_post))
        .route("/graphiql", get(graphiql));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("Mock GraphQL origin listening on http://{}/graphiql", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
