//! Per-connection session handle.
//!
//! The handle owns the sending half of a bounded outbound queue; the driver
//! owns the receiving half and forwards items to the transport. Lifecycle
//! state only moves forward: `Connecting → Active → Closing → Closed`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chatline_core::{ChatError, DeliveryFailure, Result, SessionId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionState {
    /// Handshake done, history replay not yet queued.
    Connecting = 0,
    /// Registered and receiving broadcasts.
    Active = 1,
    /// No longer eligible for broadcasts; draining.
    Closing = 2,
    /// Transport released.
    Closed = 3,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Why a session left the `Active` state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed the connection or the stream ended.
    ClientClosed,
    /// Reading from the transport failed.
    TransportError,
    /// Writing to the transport failed.
    WriteFailed,
    /// The client stopped answering pings.
    HeartbeatTimeout,
    /// A broadcast could not be queued for this session.
    DeliveryFailed,
    /// The hub is shutting down.
    HubShutdown,
}

impl CloseReason {
    /// Short label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::TransportError => "transport_error",
            Self::WriteFailed => "write_failed",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::DeliveryFailed => "delivery_failed",
            Self::HubShutdown => "hub_shutdown",
        }
    }
}

/// One item on a session's outbound queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// History replay, always the first item a session receives.
    Replay(Vec<String>),
    /// One live broadcast line, shared by every recipient.
    Line(Arc<str>),
    /// An acknowledgment addressed to this session only.
    Notice(String),
}

impl Outbound {
    /// Flatten into the text lines written to the transport.
    pub fn into_lines(self) -> Vec<String> {
        match self {
            Self::Replay(lines) => lines,
            Self::Line(line) => vec![line.to_string()],
            Self::Notice(text) => vec![text],
        }
    }
}

/// Handle for one connected client.
pub struct SessionHandle {
    /// Unique session ID.
    pub id: SessionId,
    /// When the transport handshake completed.
    pub connected_at: DateTime<Utc>,
    tx: mpsc::Sender<Outbound>,
    state: AtomicU8,
    close_reason: Mutex<Option<CloseReason>>,
    cancel: CancellationToken,
    /// Whether the client has shown activity since the last heartbeat tick.
    pub is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    dropped: AtomicU64,
}

impl SessionHandle {
    /// Create a session in the `Connecting` state.
    ///
    /// Returns the handle and the receiving end of its outbound queue.
    /// `cancel` fires when the session starts closing.
    pub fn new(
        id: SessionId,
        queue_capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let handle = Self {
            id,
            connected_at: Utc::now(),
            tx,
            state: AtomicU8::new(SessionState::Connecting as u8),
            close_reason: Mutex::new(None),
            cancel,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(Instant::now()),
            dropped: AtomicU64::new(0),
        };
        (handle, rx)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the session currently accepts broadcasts.
    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// `Connecting → Active`. Returns `false` if the session had moved on.
    pub fn activate(&self) -> bool {
        self.state
            .compare_exchange(
                SessionState::Connecting as u8,
                SessionState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `Closing` and cancel the session's tasks.
    ///
    /// Only the first call wins; it records `reason` and returns `true`.
    pub fn begin_close(&self, reason: CloseReason) -> bool {
        let transitioned = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (s < SessionState::Closing as u8).then_some(SessionState::Closing as u8)
            })
            .is_ok();
        if transitioned {
            *self.close_reason.lock() = Some(reason);
            self.cancel.cancel();
        }
        transitioned
    }

    /// Final transition once the transport is released.
    pub fn mark_closed(&self) {
        self.state.store(SessionState::Closed as u8, Ordering::Release);
    }

    /// Reason recorded by the first successful [`begin_close`](Self::begin_close).
    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.close_reason.lock()
    }

    /// Token cancelled when the session starts closing.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Queue an item for delivery without blocking.
    ///
    /// Fails with `DeliveryFailed` when the session is not `Active`, the queue
    /// is full, or the receiver is gone. New items are rejected on overflow;
    /// already-queued items are kept.
    pub fn send(&self, item: Outbound) -> Result<()> {
        if !self.is_active() {
            return Err(self.failed(DeliveryFailure::NotActive));
        }
        self.enqueue(item)
    }

    /// Queue an item regardless of state. Used for the replay batch, which is
    /// queued before the session becomes `Active`.
    pub(crate) fn enqueue(&self, item: Outbound) -> Result<()> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(self.failed(DeliveryFailure::QueueFull)),
            Err(TrySendError::Closed(_)) => Err(self.failed(DeliveryFailure::QueueClosed)),
        }
    }

    fn failed(&self, reason: DeliveryFailure) -> ChatError {
        let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
        ChatError::DeliveryFailed {
            session_id: self.id.clone(),
            reason,
        }
    }

    /// Deliveries that never reached the queue.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Record client activity (pong or any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag for the heartbeat.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last recorded activity.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn make_session(capacity: usize) -> (SessionHandle, mpsc::Receiver<Outbound>) {
        SessionHandle::new(SessionId::from("sess_1"), capacity, CancellationToken::new())
    }

    fn line(text: &str) -> Outbound {
        Outbound::Line(Arc::from(text))
    }

    #[test]
    fn starts_connecting() {
        let (session, _rx) = make_session(4);
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(session.close_reason().is_none());
    }

    #[test]
    fn send_before_activate_is_rejected() {
        let (session, _rx) = make_session(4);
        assert_matches!(
            session.send(line("x")),
            Err(ChatError::DeliveryFailed { reason: DeliveryFailure::NotActive, .. })
        );
        assert_eq!(session.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_after_activate_is_delivered() {
        let (session, mut rx) = make_session(4);
        assert!(session.activate());
        session.send(line("hello")).unwrap();
        assert_eq!(rx.recv().await.unwrap(), line("hello"));
    }

    #[test]
    fn activate_is_one_shot() {
        let (session, _rx) = make_session(4);
        assert!(session.activate());
        assert!(!session.activate());
    }

    #[test]
    fn full_queue_rejects_new_items() {
        let (session, mut rx) = make_session(1);
        let _ = session.activate();
        session.send(line("first")).unwrap();
        assert_matches!(
            session.send(line("second")),
            Err(ChatError::DeliveryFailed { reason: DeliveryFailure::QueueFull, .. })
        );
        assert_eq!(rx.try_recv().unwrap(), line("first"));
    }

    #[test]
    fn closed_receiver_is_reported() {
        let (session, rx) = make_session(4);
        let _ = session.activate();
        drop(rx);
        assert_matches!(
            session.send(line("x")),
            Err(ChatError::DeliveryFailed { reason: DeliveryFailure::QueueClosed, .. })
        );
    }

    #[test]
    fn begin_close_first_reason_wins() {
        let (session, _rx) = make_session(4);
        let token = session.cancel_token();
        let _ = session.activate();

        assert!(session.begin_close(CloseReason::HeartbeatTimeout));
        assert!(!session.begin_close(CloseReason::ClientClosed));
        assert_eq!(session.state(), SessionState::Closing);
        assert_eq!(session.close_reason(), Some(CloseReason::HeartbeatTimeout));
        assert!(token.is_cancelled());
    }

    #[test]
    fn closing_session_rejects_sends() {
        let (session, _rx) = make_session(4);
        let _ = session.activate();
        let _ = session.begin_close(CloseReason::ClientClosed);
        assert!(session.send(line("late")).is_err());
    }

    #[test]
    fn state_never_moves_backwards() {
        let (session, _rx) = make_session(4);
        let _ = session.begin_close(CloseReason::HubShutdown);
        assert!(!session.activate());
        session.mark_closed();
        assert!(!session.begin_close(CloseReason::ClientClosed));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn enqueue_ignores_state() {
        let (session, mut rx) = make_session(4);
        session
            .enqueue(Outbound::Replay(vec!["a : 1".into()]))
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), Outbound::Replay(vec!["a : 1".into()]));
    }

    #[test]
    fn mark_alive_and_check() {
        let (session, _rx) = make_session(4);
        assert!(session.check_alive());
        assert!(!session.check_alive());
        session.mark_alive();
        assert!(session.check_alive());
        assert!(session.last_pong_elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn outbound_into_lines() {
        assert_eq!(
            Outbound::Replay(vec!["a".into(), "b".into()]).into_lines(),
            vec!["a", "b"]
        );
        assert_eq!(line("c").into_lines(), vec!["c"]);
        assert_eq!(Outbound::Notice("! n".into()).into_lines(), vec!["! n"]);
    }
}
