//! Hub runtime configuration.

use std::time::Duration;

use chatline_settings::HubSettings;

/// Tuning knobs for a [`Hub`](crate::Hub).
#[derive(Clone, Debug)]
pub struct HubConfig {
    /// Messages retained for replay (`None` keeps everything).
    pub history_capacity: Option<usize>,
    /// Per-session outbound queue depth.
    pub queue_capacity: usize,
    /// Upper bound on flushing a closing session's queue.
    pub drain_timeout: Duration,
    /// Interval between server pings.
    pub heartbeat_interval: Duration,
    /// Close a session after this long without a pong.
    pub heartbeat_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::from(&HubSettings::default())
    }
}

impl From<&HubSettings> for HubConfig {
    fn from(settings: &HubSettings) -> Self {
        Self {
            history_capacity: (settings.history_capacity > 0).then_some(settings.history_capacity),
            queue_capacity: settings.queue_capacity.max(1),
            drain_timeout: Duration::from_millis(settings.drain_timeout_ms),
            heartbeat_interval: Duration::from_millis(settings.heartbeat_interval_ms.max(1)),
            heartbeat_timeout: Duration::from_millis(settings.heartbeat_timeout_ms),
        }
    }
}
