//! The transport boundary consumed by the session driver.
//!
//! Any full-duplex, message-oriented connection can carry a session: it
//! needs an inbound frame stream ([`FrameSource`]) and an outbound half that
//! can write text, ping, and close ([`FrameSink`]).

use async_trait::async_trait;
use chatline_core::TransportError;

/// One frame read from the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundFrame {
    /// A UTF-8 text frame.
    Text(String),
    /// A binary frame; accepted when it holds valid UTF-8.
    Binary(Vec<u8>),
    /// Liveness reply (pong or ping from the client).
    Pong,
    /// The client asked to close.
    Close,
}

/// Inbound half of a transport. A finite, non-restartable sequence.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the connection has ended.
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>>;
}

/// Outbound half of a transport.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one text line.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;
    /// Send a liveness ping.
    async fn send_ping(&mut self) -> Result<(), TransportError>;
    /// Close the connection and release the resource.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// In-process transport over channels.
///
/// Lets the hub run without a network listener, for embedding and tests.
pub mod memory {
    use super::{FrameSink, FrameSource, InboundFrame};
    use async_trait::async_trait;
    use chatline_core::TransportError;
    use tokio::sync::mpsc;

    /// What the server side wrote to the client.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum SinkEvent {
        /// A text line.
        Text(String),
        /// A ping.
        Ping,
        /// The server closed the connection.
        Closed,
    }

    /// Server-side inbound half.
    pub struct MemorySource {
        rx: mpsc::UnboundedReceiver<Result<InboundFrame, TransportError>>,
    }

    /// Server-side outbound half.
    pub struct MemorySink {
        tx: mpsc::UnboundedSender<SinkEvent>,
    }

    /// The client's end of an in-memory connection.
    pub struct MemoryClient {
        inbound: mpsc::UnboundedSender<Result<InboundFrame, TransportError>>,
        outbound: mpsc::UnboundedReceiver<SinkEvent>,
    }

    /// Create a connected `(source, sink, client)` triple.
    pub fn pair() -> (MemorySource, MemorySink, MemoryClient) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (
            MemorySource { rx: in_rx },
            MemorySink { tx: out_tx },
            MemoryClient {
                inbound: in_tx,
                outbound: out_rx,
            },
        )
    }

    #[async_trait]
    impl FrameSource for MemorySource {
        async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>> {
            self.rx.recv().await
        }
    }

    #[async_trait]
    impl FrameSink for MemorySink {
        async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
            self.tx
                .send(SinkEvent::Text(text))
                .map_err(|_| TransportError::Closed("client dropped".into()))
        }

        async fn send_ping(&mut self) -> Result<(), TransportError> {
            self.tx
                .send(SinkEvent::Ping)
                .map_err(|_| TransportError::Closed("client dropped".into()))
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            // the client may already be gone; closing is still complete
            let _ = self.tx.send(SinkEvent::Closed);
            Ok(())
        }
    }

    impl MemoryClient {
        /// Send a text frame. Returns `false` if the server side is gone.
        pub fn send_text(&self, text: impl Into<String>) -> bool {
            self.inbound.send(Ok(InboundFrame::Text(text.into()))).is_ok()
        }

        /// Send an arbitrary frame or transport failure.
        pub fn send_frame(&self, frame: Result<InboundFrame, TransportError>) -> bool {
            self.inbound.send(frame).is_ok()
        }

        /// Send a close frame.
        pub fn close(&self) -> bool {
            self.inbound.send(Ok(InboundFrame::Close)).is_ok()
        }

        /// Next event written by the server, pings included.
        pub async fn next_event(&mut self) -> Option<SinkEvent> {
            self.outbound.recv().await
        }

        /// Next text line, skipping pings. `None` once closed.
        pub async fn next_text(&mut self) -> Option<String> {
            loop {
                match self.outbound.recv().await? {
                    SinkEvent::Text(text) => return Some(text),
                    SinkEvent::Ping => {}
                    SinkEvent::Closed => return None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::{SinkEvent, pair};
    use super::*;

    #[tokio::test]
    async fn memory_frames_flow_both_ways() {
        let (mut source, mut sink, mut client) = pair();

        assert!(client.send_text("alice : hi"));
        assert_eq!(
            source.next_frame().await.unwrap().unwrap(),
            InboundFrame::Text("alice : hi".into())
        );

        sink.send_ping().await.unwrap();
        sink.send_text("line".into()).await.unwrap();
        assert_eq!(client.next_event().await, Some(SinkEvent::Ping));
        assert_eq!(client.next_event().await, Some(SinkEvent::Text("line".into())));
    }

    #[tokio::test]
    async fn next_text_skips_pings_and_stops_at_close() {
        let (_source, mut sink, mut client) = pair();
        sink.send_ping().await.unwrap();
        sink.send_text("a".into()).await.unwrap();
        sink.close().await.unwrap();

        assert_eq!(client.next_text().await.as_deref(), Some("a"));
        assert_eq!(client.next_text().await, None);
    }

    #[tokio::test]
    async fn source_ends_when_client_dropped() {
        let (mut source, _sink, client) = pair();
        drop(client);
        assert!(source.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn sink_reports_dropped_client() {
        let (_source, mut sink, client) = pair();
        drop(client);
        assert!(sink.send_text("x".into()).await.is_err());
        assert!(sink.close().await.is_ok());
    }
}
