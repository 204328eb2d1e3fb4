//! Error hierarchy for the chatline relay.
//!
//! Every per-session failure is isolated to that session. Only
//! [`ChatError::ResourceExhausted`] is surfaced past a dispatch call, and even
//! that never terminates the hub.

use thiserror::Error;

use crate::ids::SessionId;

/// Why a single outbound delivery did not reach a session's queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The bounded outbound queue is full (slow consumer).
    QueueFull,
    /// The receiving end of the queue is gone.
    QueueClosed,
    /// The session is no longer `Active`.
    NotActive,
}

impl DeliveryFailure {
    /// Short label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QueueFull => "queue_full",
            Self::QueueClosed => "queue_closed",
            Self::NotActive => "not_active",
        }
    }
}

impl std::fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the history log, registry, and hub.
#[derive(Debug, Error)]
pub enum ChatError {
    /// `add` was called with an ID that is already registered.
    #[error("session {0} is already registered")]
    DuplicateSession(SessionId),

    /// History or queue storage could not grow.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A push onto one session's outbound queue failed.
    #[error("delivery to session {session_id} failed: {reason}")]
    DeliveryFailed {
        /// Session that missed the delivery.
        session_id: SessionId,
        /// What went wrong.
        reason: DeliveryFailure,
    },

    /// The session is unknown to the hub.
    #[error("session {0} is not registered")]
    UnknownSession(SessionId),

    /// The hub is shutting down and accepts no new sessions.
    #[error("hub is shutting down")]
    HubClosed,

    /// The underlying connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ChatError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateSession(_) => "DUPLICATE_SESSION",
            Self::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            Self::DeliveryFailed { .. } => "DELIVERY_FAILED",
            Self::UnknownSession(_) => "UNKNOWN_SESSION",
            Self::HubClosed => "HUB_CLOSED",
            Self::Transport(_) => "TRANSPORT_ERROR",
        }
    }
}

/// Failures of the full-duplex transport under a session.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer went away or the connection was reset.
    #[error("connection closed: {0}")]
    Closed(String),
    /// A frame could not be read or written.
    #[error("transport I/O failed: {0}")]
    Io(String),
}

/// Result alias for chatline operations.
pub type Result<T> = std::result::Result<T, ChatError>;
