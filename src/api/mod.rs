//! Crash Game API Service
//!
//! HTTP endpoints for betting and cashing out, plus a WebSocket stream of
//! round events.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod websocket;

pub use server::ApiServer;
pub use websocket::WebSocketManager;
