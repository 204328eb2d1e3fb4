//! # chatline-server
//!
//! Axum HTTP + `WebSocket` surface for the broadcast hub.
//!
//! - `GET /api/ws`: `WebSocket` gateway, one hub session per connection
//! - `GET /api/info_list`: current history as a JSON array of lines
//! - `GET|POST /api/empty_info`: clear history
//! - `GET /health`, `GET /metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{AppState, ChatServer};
pub use shutdown::ShutdownCoordinator;
