//! HTTP API Module
//!
//! Serves the peer protocol and the client endpoints of one node.

mod http;

pub use http::{AppState, HttpServer};
