//! Prometheus metrics recorder and `/metrics` endpoint handler.

use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Periodically drain histogram buckets until `cancel` fires.
pub fn spawn_upkeep(
    handle: PrometheusHandle,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => handle.run_upkeep(),
                () = cancel.cancelled() => break,
            }
        }
    })
}

/// `WebSocket` upgrades refused at the connection limit (counter).
pub const CHAT_CONNECTIONS_REJECTED_TOTAL: &str = "chat_connections_rejected_total";
/// HTTP history clears (counter).
pub const CHAT_HISTORY_CLEARS_TOTAL: &str = "chat_history_clears_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_render() {
        // No global install, to avoid conflicts between tests.
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = render(&handle);
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[tokio::test]
    async fn upkeep_stops_on_cancel() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let cancel = CancellationToken::new();
        let task = spawn_upkeep(handle, Duration::from_millis(5), cancel.clone());
        cancel.cancel();
        task.await.unwrap();
    }

    #[test]
    fn metric_constants_are_snake_case() {
        for name in [CHAT_CONNECTIONS_REJECTED_TOTAL, CHAT_HISTORY_CLEARS_TOTAL] {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
