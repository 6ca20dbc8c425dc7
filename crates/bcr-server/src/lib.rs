//! HTTP/WebSocket surface and intake for blockchess-relay.
//!
//! `main.rs` is intentionally thin: tracing, config, wiring, serve. Route
//! handlers live in `routes`, the WebSocket session loop in `ws`, and all
//! queue admission logic in `intake`.

pub mod intake;
pub mod routes;
pub mod state;
pub mod ws;
