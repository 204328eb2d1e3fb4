//! axum `WebSocket` halves as [`FrameSource`] / [`FrameSink`].

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use chatline_core::TransportError;
use chatline_hub::{FrameSink, FrameSource, InboundFrame};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

/// Inbound half of a `WebSocket`.
pub struct WsSource {
    inner: SplitStream<WebSocket>,
}

impl WsSource {
    /// Wrap the read half of a split socket.
    pub fn new(inner: SplitStream<WebSocket>) -> Self {
        Self { inner }
    }
}

/// Outbound half of a `WebSocket`.
pub struct WsSink {
    inner: SplitSink<WebSocket, Message>,
}

impl WsSink {
    /// Wrap the write half of a split socket.
    pub fn new(inner: SplitSink<WebSocket, Message>) -> Self {
        Self { inner }
    }
}

/// Map a `WebSocket` message onto the transport-neutral frame.
pub fn to_frame(msg: Message) -> InboundFrame {
    match msg {
        Message::Text(text) => InboundFrame::Text(text.as_str().to_owned()),
        Message::Binary(data) => InboundFrame::Binary(data.to_vec()),
        Message::Ping(_) | Message::Pong(_) => InboundFrame::Pong,
        Message::Close(_) => InboundFrame::Close,
    }
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        let msg = self.inner.next().await?;
        Some(
            msg.map(to_frame)
                .map_err(|e| TransportError::Io(e.to_string())),
        )
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.inner
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::close(&mut self.inner)
            .await
            .map_err(|e| TransportError::Closed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_maps_to_text_frame() {
        assert_eq!(
            to_frame(Message::Text("alice : hi".into())),
            InboundFrame::Text("alice : hi".into())
        );
    }

    #[test]
    fn binary_keeps_bytes() {
        assert_eq!(
            to_frame(Message::Binary(b"bob : yo".to_vec().into())),
            InboundFrame::Binary(b"bob : yo".to_vec())
        );
    }

    #[test]
    fn control_frames() {
        assert_eq!(to_frame(Message::Ping(Vec::new().into())), InboundFrame::Pong);
        assert_eq!(to_frame(Message::Pong(Vec::new().into())), InboundFrame::Pong);
        assert_eq!(to_frame(Message::Close(None)), InboundFrame::Close);
    }
}
