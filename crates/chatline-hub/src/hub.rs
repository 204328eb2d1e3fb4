//! The broadcast hub: serialized append + fan-out with history replay.
//!
//! A single dispatch lock covers three critical sections:
//! - connect: register, snapshot history, queue the replay batch
//! - submit: append to history, push the rendered line to every session
//! - shutdown: close and drain every session
//!
//! Holding it across append and fan-out gives every session the same total
//! order. Holding it across register and replay means a new session sees
//! each message exactly once, either in its replay or live, never both.

use std::sync::Arc;
use std::time::Instant;

use chatline_core::{ChatError, DeliveryFailure, HistoryLog, Message, Result, SessionId, Submission};
use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::metrics::{
    CHAT_DELIVERY_FAILURES_TOTAL, CHAT_DISPATCH_DURATION_SECONDS, CHAT_HISTORY_SIZE,
    CHAT_MESSAGES_REJECTED_TOTAL, CHAT_MESSAGES_TOTAL, CHAT_SESSIONS_ACTIVE, CHAT_SESSIONS_TOTAL,
};
use crate::registry::ConnectionRegistry;
use crate::session::{CloseReason, Outbound, SessionHandle};

/// Prefix of acknowledgment lines sent to a single session.
pub const NOTICE_PREFIX: &str = "! ";

/// Central coordinator for all sessions.
pub struct Hub {
    config: HubConfig,
    history: HistoryLog,
    registry: ConnectionRegistry,
    dispatch_lock: Mutex<()>,
    shutdown: CancellationToken,
}

impl Hub {
    /// Create a hub with an empty history.
    pub fn new(config: HubConfig) -> Self {
        let history = HistoryLog::new(config.history_capacity);
        Self::with_history(config, history)
    }

    /// Create a hub around an existing history log.
    pub fn with_history(config: HubConfig, history: HistoryLog) -> Self {
        Self {
            history,
            registry: ConnectionRegistry::new(),
            dispatch_lock: Mutex::new(()),
            shutdown: CancellationToken::new(),
            config,
        }
    }

    /// Hub configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Open a session: register it and queue the history replay.
    ///
    /// The replay batch (if history is non-empty) is the first item on the
    /// returned queue; live broadcasts follow it.
    pub fn connect(&self) -> Result<(Arc<SessionHandle>, mpsc::Receiver<Outbound>)> {
        let (session, rx) = SessionHandle::new(
            SessionId::new(),
            self.config.queue_capacity,
            self.shutdown.child_token(),
        );
        let session = Arc::new(session);

        let _guard = self.dispatch_lock.lock();
        if self.shutdown.is_cancelled() {
            return Err(ChatError::HubClosed);
        }
        self.registry.add(Arc::clone(&session))?;

        let replay = self.history.rendered();
        let replayed = replay.len();
        if !replay.is_empty() {
            if let Err(e) = session.enqueue(Outbound::Replay(replay)) {
                let _ = self.registry.remove(&session.id);
                return Err(e);
            }
        }
        let _ = session.activate();

        counter!(CHAT_SESSIONS_TOTAL).increment(1);
        gauge!(CHAT_SESSIONS_ACTIVE).set(self.registry.len() as f64);
        info!(session_id = %session.id, replayed, "session registered");
        Ok((session, rx))
    }

    /// Accept a submission from a registered session.
    ///
    /// Empty sender or body: dropped, `Ok(None)`. Otherwise the message is
    /// sequenced and pushed to every registered session, the sender
    /// included. Sessions whose queue rejects the line are closed after the
    /// fan-out; the rest are unaffected.
    pub fn submit(&self, from: &SessionId, submission: Submission) -> Result<Option<Arc<Message>>> {
        if !submission.is_valid() {
            counter!(CHAT_MESSAGES_REJECTED_TOTAL, "reason" => "empty").increment(1);
            debug!(session_id = %from, "dropping empty submission");
            return Ok(None);
        }

        let started = Instant::now();
        let _guard = self.dispatch_lock.lock();

        let sender = self
            .registry
            .get(from)
            .filter(|s| s.is_active())
            .ok_or_else(|| ChatError::UnknownSession(from.clone()))?;

        let message = match self.history.append(submission.sender, submission.body) {
            Ok(message) => message,
            Err(e) => {
                counter!(CHAT_MESSAGES_REJECTED_TOTAL, "reason" => "exhausted").increment(1);
                warn!(session_id = %from, error = %e, "failed to append message");
                let notice = Outbound::Notice(format!("{NOTICE_PREFIX}submit failed: {e}"));
                if sender.send(notice).is_err() {
                    debug!(session_id = %from, "could not acknowledge failed submit");
                }
                return Err(e);
            }
        };

        let failed = self.fan_out(&message);
        for id in &failed {
            self.disconnect(id, CloseReason::DeliveryFailed);
        }

        counter!(CHAT_MESSAGES_TOTAL).increment(1);
        gauge!(CHAT_HISTORY_SIZE).set(self.history.len() as f64);
        histogram!(CHAT_DISPATCH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        Ok(Some(message))
    }

    /// Push one rendered message to every registered session.
    ///
    /// Returns the sessions that could not take it.
    fn fan_out(&self, message: &Message) -> Vec<SessionId> {
        let line: Arc<str> = Arc::from(message.render());
        let mut failed = Vec::new();
        let mut recipients = 0u32;

        self.registry.for_each_active(|session| {
            match session.send(Outbound::Line(Arc::clone(&line))) {
                Ok(()) => recipients += 1,
                // already closing; its driver deregisters it
                Err(ChatError::DeliveryFailed {
                    reason: DeliveryFailure::NotActive,
                    ..
                }) => {}
                Err(ChatError::DeliveryFailed { reason, .. }) => {
                    counter!(CHAT_DELIVERY_FAILURES_TOTAL, "reason" => reason.as_str()).increment(1);
                    warn!(
                        session_id = %session.id,
                        sequence = message.sequence,
                        reason = reason.as_str(),
                        total_drops = session.drop_count(),
                        "delivery failed, closing session"
                    );
                    failed.push(session.id.clone());
                }
                Err(e) => {
                    warn!(session_id = %session.id, error = %e, "unexpected delivery error");
                    failed.push(session.id.clone());
                }
            }
        });

        debug!(sequence = message.sequence, recipients, "broadcast message");
        failed
    }

    /// Take a session out of the broadcast set and start closing it.
    ///
    /// Idempotent; unknown IDs are ignored.
    pub fn disconnect(&self, id: &SessionId, reason: CloseReason) {
        if let Some(session) = self.registry.remove(id) {
            let _ = session.begin_close(reason);
            gauge!(CHAT_SESSIONS_ACTIVE).set(self.registry.len() as f64);
            info!(session_id = %id, reason = reason.as_str(), "session deregistered");
        }
    }

    /// Rendered history lines, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.history.rendered()
    }

    /// Sequenced history, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<Message>> {
        self.history.snapshot()
    }

    /// Drop all retained history.
    pub fn clear_history(&self) {
        let _guard = self.dispatch_lock.lock();
        self.history.clear();
        gauge!(CHAT_HISTORY_SIZE).set(0.0);
        info!(last_sequence = self.history.last_sequence(), "history cleared");
    }

    /// Number of retained history entries.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Handles of every registered session.
    pub fn sessions(&self) -> Vec<Arc<SessionHandle>> {
        let mut sessions = Vec::with_capacity(self.registry.len());
        self.registry.for_each_active(|s| sessions.push(Arc::clone(s)));
        sessions
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Close every session and refuse new ones.
    pub fn shutdown(&self) {
        let _guard = self.dispatch_lock.lock();
        let sessions = self.registry.drain();
        let closed = sessions.len();
        for session in sessions {
            let _ = session.begin_close(CloseReason::HubShutdown);
        }
        self.shutdown.cancel();
        gauge!(CHAT_SESSIONS_ACTIVE).set(0.0);
        info!(closed, "hub shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use assert_matches::assert_matches;

    fn make_hub() -> Hub {
        Hub::new(HubConfig::default())
    }

    fn drain_lines(rx: &mut mpsc::Receiver<Outbound>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(item) = rx.try_recv() {
            lines.extend(item.into_lines());
        }
        lines
    }

    #[test]
    fn first_session_gets_no_replay() {
        let hub = make_hub();
        let (session, mut rx) = hub.connect().unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn submit_echoes_to_sender_and_others() {
        let hub = make_hub();
        let (alice, mut rx_a) = hub.connect().unwrap();
        let (_bob, mut rx_b) = hub.connect().unwrap();

        let msg = hub
            .submit(&alice.id, Submission::new("alice", "hi"))
            .unwrap()
            .unwrap();
        assert_eq!(msg.sequence, 1);
        assert_eq!(drain_lines(&mut rx_a), vec!["alice : hi"]);
        assert_eq!(drain_lines(&mut rx_b), vec!["alice : hi"]);
    }

    #[test]
    fn late_joiner_gets_replay_first() {
        let hub = make_hub();
        let (alice, _rx_a) = hub.connect().unwrap();
        let _ = hub.submit(&alice.id, Submission::new("alice", "hi")).unwrap();

        let (_bob, mut rx_b) = hub.connect().unwrap();
        assert_eq!(
            rx_b.try_recv().unwrap(),
            Outbound::Replay(vec!["alice : hi".to_string()])
        );

        let _ = hub.submit(&alice.id, Submission::new("alice", "again")).unwrap();
        assert_eq!(drain_lines(&mut rx_b), vec!["alice : again"]);
    }

    #[test]
    fn empty_submissions_are_dropped() {
        let hub = make_hub();
        let (alice, mut rx) = hub.connect().unwrap();
        assert!(hub.submit(&alice.id, Submission::new("", "hi")).unwrap().is_none());
        assert!(hub.submit(&alice.id, Submission::new("alice", "")).unwrap().is_none());
        assert_eq!(hub.history_len(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn exhausted_history_notifies_only_the_sender() {
        let hub = Hub::with_history(
            HubConfig::default(),
            HistoryLog::with_next_sequence(None, u64::MAX),
        );
        let (alice, mut rx_a) = hub.connect().unwrap();
        let (bob, mut rx_b) = hub.connect().unwrap();

        assert_matches!(
            hub.submit(&alice.id, Submission::new("alice", "one too many")),
            Err(ChatError::ResourceExhausted(_))
        );

        let notice = rx_a.try_recv().unwrap();
        assert_matches!(
            &notice,
            Outbound::Notice(text) if text.starts_with("! submit failed: ")
        );
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
        assert_eq!(hub.history_len(), 0);

        assert!(alice.is_active());
        assert!(bob.is_active());
        assert_eq!(hub.session_count(), 2);
    }

    #[test]
    fn submit_from_unknown_session_is_error() {
        let hub = make_hub();
        assert_matches!(
            hub.submit(&SessionId::from("ghost"), Submission::new("a", "b")),
            Err(ChatError::UnknownSession(_))
        );
        assert_eq!(hub.history_len(), 0);
    }

    #[test]
    fn disconnected_session_receives_nothing_more() {
        let hub = make_hub();
        let (alice, _rx_a) = hub.connect().unwrap();
        let (bob, mut rx_b) = hub.connect().unwrap();

        hub.disconnect(&bob.id, CloseReason::ClientClosed);
        let _ = hub.submit(&alice.id, Submission::new("alice", "bye")).unwrap();

        assert!(drain_lines(&mut rx_b).is_empty());
        assert_eq!(bob.state(), SessionState::Closing);
        assert_eq!(hub.session_count(), 1);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let hub = make_hub();
        let (alice, _rx) = hub.connect().unwrap();
        hub.disconnect(&alice.id, CloseReason::ClientClosed);
        hub.disconnect(&alice.id, CloseReason::TransportError);
        assert_eq!(alice.close_reason(), Some(CloseReason::ClientClosed));
        assert_eq!(hub.session_count(), 0);
    }

    #[test]
    fn slow_session_is_closed_without_affecting_others() {
        let hub = Hub::new(HubConfig {
            queue_capacity: 1,
            ..HubConfig::default()
        });
        let (alice, mut rx_a) = hub.connect().unwrap();
        let (slow, _rx_slow) = hub.connect().unwrap();

        let _ = hub.submit(&alice.id, Submission::new("alice", "1")).unwrap();
        let _ = drain_lines(&mut rx_a);
        let _ = hub.submit(&alice.id, Submission::new("alice", "2")).unwrap();

        assert_eq!(drain_lines(&mut rx_a), vec!["alice : 2"]);
        assert_eq!(slow.close_reason(), Some(CloseReason::DeliveryFailed));
        assert_eq!(hub.session_count(), 1);
    }

    #[test]
    fn delivery_failure_is_logged_with_reason() {
        let (logs, _guard) = chatline_core::logging::capture_logs();
        let hub = Hub::new(HubConfig {
            queue_capacity: 1,
            ..HubConfig::default()
        });
        let (alice, _rx_a) = hub.connect().unwrap();
        let _ = hub.submit(&alice.id, Submission::new("alice", "1")).unwrap();
        let _ = hub.submit(&alice.id, Submission::new("alice", "2")).unwrap();

        assert!(logs.has_event(tracing::Level::WARN, "delivery failed"));
        assert!(logs.has_field("reason", "queue_full"));
        assert!(logs.has_event(tracing::Level::INFO, "session deregistered"));
    }

    #[test]
    fn bounded_history_replays_most_recent() {
        let hub = Hub::new(HubConfig {
            history_capacity: Some(2),
            ..HubConfig::default()
        });
        let (alice, _rx) = hub.connect().unwrap();
        for body in ["1", "2", "3"] {
            let _ = hub.submit(&alice.id, Submission::new("a", body)).unwrap();
        }
        let (_late, mut rx_late) = hub.connect().unwrap();
        assert_eq!(drain_lines(&mut rx_late), vec!["a : 2", "a : 3"]);
    }

    #[test]
    fn clear_history_empties_replay() {
        let hub = make_hub();
        let (alice, _rx) = hub.connect().unwrap();
        let _ = hub.submit(&alice.id, Submission::new("a", "x")).unwrap();
        hub.clear_history();
        assert!(hub.history().is_empty());

        let (_late, mut rx_late) = hub.connect().unwrap();
        assert!(rx_late.try_recv().is_err());

        let next = hub.submit(&alice.id, Submission::new("a", "y")).unwrap().unwrap();
        assert_eq!(next.sequence, 2);
    }

    #[test]
    fn shutdown_closes_all_and_refuses_new() {
        let hub = make_hub();
        let (a, _rx_a) = hub.connect().unwrap();
        let (b, _rx_b) = hub.connect().unwrap();
        let token = a.cancel_token();

        hub.shutdown();
        assert!(hub.is_shutting_down());
        assert_eq!(hub.session_count(), 0);
        assert_eq!(a.close_reason(), Some(CloseReason::HubShutdown));
        assert_eq!(b.close_reason(), Some(CloseReason::HubShutdown));
        assert!(token.is_cancelled());
        assert_matches!(hub.connect(), Err(ChatError::HubClosed));
    }

    #[test]
    fn concurrent_senders_observe_one_order() {
        let hub = Arc::new(make_hub());
        let (a, mut rx_a) = hub.connect().unwrap();
        let (b, mut rx_b) = hub.connect().unwrap();

        let handles: Vec<_> = [(Arc::clone(&a), "a"), (Arc::clone(&b), "b")]
            .into_iter()
            .map(|(session, name)| {
                let hub = Arc::clone(&hub);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let _ = hub
                            .submit(&session.id, Submission::new(name, i.to_string()))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let seen_a = drain_lines(&mut rx_a);
        let seen_b = drain_lines(&mut rx_b);
        assert_eq!(seen_a.len(), 100);
        assert_eq!(seen_a, seen_b);
        assert_eq!(seen_a, hub.history());
    }
}
