//! Graceful shutdown: one cancellation token plus a tracker for every
//! upgraded `WebSocket` task.
//!
//! axum's graceful shutdown only covers HTTP connections; an upgraded socket
//! runs in its own task. Sessions are therefore registered here so shutdown
//! can wait for their drain before the runtime goes away.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tracing::{info, warn};

/// Default budget for draining the server and its sessions.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the shutdown signal and the set of live session tasks.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a coordinator with no sessions.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            sessions: TaskTracker::new(),
        }
    }

    /// A token cancelled when shutdown starts.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Count a session as live until the returned token is dropped.
    ///
    /// Taken before the upgrade completes, so a session cannot slip past a
    /// shutdown that starts in between.
    pub fn session_token(&self) -> TaskTrackerToken {
        self.sessions.token()
    }

    /// Sessions still running.
    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Signal shutdown, then wait for `handles` and every live session.
    ///
    /// Both phases share one `timeout` budget (10s when `None`). Returns
    /// whether everything finished in time.
    pub async fn graceful_shutdown(
        &self,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> bool {
        let budget = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        let deadline = Instant::now() + budget;

        self.shutdown();
        let _ = self.sessions.close();
        info!(
            tasks = handles.len(),
            sessions = self.sessions.len(),
            budget_ms = budget.as_millis(),
            "draining"
        );

        let tasks = futures::future::join_all(handles);
        if tokio::time::timeout_at(deadline, tasks).await.is_err() {
            warn!(?budget, "server tasks still running at shutdown deadline");
            return false;
        }
        if tokio::time::timeout_at(deadline, self.sessions.wait())
            .await
            .is_err()
        {
            warn!(
                ?budget,
                sessions = self.sessions.len(),
                "sessions still draining at shutdown deadline"
            );
            return false;
        }
        info!("drain complete");
        true
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
