//! querygate reverse proxy.
//!
//! Relays all traffic to a single GraphQL origin. GET/POST on the GraphQL
//! path are instrumented: the origin's `extensions` block is stripped from
//! the client response and posted to a metrics sink. Everything else is
//! streamed through untouched.

pub mod admin;
pub mod error;
pub mod instrumented;
pub mod logging_layer;
pub mod proxy_config;
pub mod proxy_service;
pub mod server;
pub mod traffic;
