//! `WebSocket` gateway.
//!
//! `adapter` maps an axum [`WebSocket`](axum::extract::ws::WebSocket) onto
//! the hub's transport boundary; [`serve_socket`] runs one hub session over
//! an upgraded connection.

pub mod adapter;

use std::sync::Arc;

use axum::extract::ws::WebSocket;
use chatline_hub::{Hub, run_session};
use futures::StreamExt;
use tracing::debug;

use self::adapter::{WsSink, WsSource};

/// Drive one upgraded connection until its session ends.
pub async fn serve_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (sink, source) = socket.split();
    let reason = run_session(hub, WsSource::new(source), WsSink::new(sink)).await;
    debug!(reason = reason.as_str(), "websocket closed");
}
