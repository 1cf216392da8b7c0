//! Test helpers for querygate integration tests.
//!
//! - Mock GraphQL origin that records what the proxy forwarded
//! - Mock metrics sink that records posted metrics records
//! - In-process proxy bound on an ephemeral port

#![allow(unused_imports)] // Re-exports may not be used by all test files

pub mod mock_origin;
pub mod mock_sink;
pub mod proxy;

pub use mock_origin::*;
pub use mock_sink::*;
pub use proxy::*;
