//! Append-only message history replayed to newly connected sessions.
//!
//! Sequence numbers are assigned under the same lock that stores the
//! message, so they are strictly increasing with no gaps or duplicates. In
//! bounded mode the oldest entries are evicted first; eviction and
//! [`HistoryLog::clear`] never rewind the sequence counter.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::{ChatError, Result};
use crate::message::Message;

struct Inner {
    entries: VecDeque<Arc<Message>>,
    next_sequence: u64,
}

/// Ordered log of past messages, safe for concurrent append and snapshot.
pub struct HistoryLog {
    inner: Mutex<Inner>,
    capacity: Option<usize>,
}

impl HistoryLog {
    /// Create a log. `None` (or `Some(0)`) keeps every message.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::new(),
                next_sequence: 1,
            }),
            capacity: capacity.filter(|&c| c > 0),
        }
    }

    /// Empty log whose first append gets `next_sequence`.
    ///
    /// Used to resume numbering after a restart. `0` is treated as `1`.
    pub fn with_next_sequence(capacity: Option<usize>, next_sequence: u64) -> Self {
        let log = Self::new(capacity);
        log.inner.lock().next_sequence = next_sequence.max(1);
        log
    }

    /// Unbounded log.
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Sequence and store a new message.
    pub fn append(&self, sender: impl Into<String>, body: impl Into<String>) -> Result<Arc<Message>> {
        let mut inner = self.inner.lock();
        let sequence = inner.next_sequence;
        let next = sequence
            .checked_add(1)
            .ok_or_else(|| ChatError::ResourceExhausted("sequence numbers exhausted".into()))?;

        let at_capacity = self.capacity.is_some_and(|cap| inner.entries.len() >= cap);
        if at_capacity {
            let _ = inner.entries.pop_front();
        } else {
            inner
                .entries
                .try_reserve(1)
                .map_err(|e| ChatError::ResourceExhausted(format!("history storage: {e}")))?;
        }

        let message = Arc::new(Message::new(sender, body, sequence));
        inner.entries.push_back(Arc::clone(&message));
        inner.next_sequence = next;
        Ok(message)
    }

    /// Point-in-time copy of the retained messages, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<Message>> {
        self.inner.lock().entries.iter().cloned().collect()
    }

    /// Snapshot rendered as display lines.
    pub fn rendered(&self) -> Vec<String> {
        self.inner.lock().entries.iter().map(|m| m.render()).collect()
    }

    /// Drop every retained message. The sequence keeps counting.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Number of retained messages.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether no messages are retained.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Retention bound, if any.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Sequence number of the most recent append (0 before any append).
    pub fn last_sequence(&self) -> u64 {
        self.inner.lock().next_sequence - 1
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::unbounded()
    }
}
