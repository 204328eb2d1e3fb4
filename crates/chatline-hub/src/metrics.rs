//! Metric names shared by the hub and the HTTP exporter.

/// Messages accepted and broadcast (counter).
pub const CHAT_MESSAGES_TOTAL: &str = "chat_messages_total";
/// Submissions dropped before dispatch (counter, labels: reason).
pub const CHAT_MESSAGES_REJECTED_TOTAL: &str = "chat_messages_rejected_total";
/// Per-session delivery failures (counter, labels: reason).
pub const CHAT_DELIVERY_FAILURES_TOTAL: &str = "chat_delivery_failures_total";
/// Sessions currently registered (gauge).
pub const CHAT_SESSIONS_ACTIVE: &str = "chat_sessions_active";
/// Sessions opened (counter).
pub const CHAT_SESSIONS_TOTAL: &str = "chat_sessions_total";
/// Messages retained in history (gauge).
pub const CHAT_HISTORY_SIZE: &str = "chat_history_size";
/// Time spent in append + fan-out (histogram).
pub const CHAT_DISPATCH_DURATION_SECONDS: &str = "chat_dispatch_duration_seconds";
/// Session lifetime in seconds (histogram).
pub const CHAT_SESSION_DURATION_SECONDS: &str = "chat_session_duration_seconds";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_are_snake_case() {
        let names = [
            CHAT_MESSAGES_TOTAL,
            CHAT_MESSAGES_REJECTED_TOTAL,
            CHAT_DELIVERY_FAILURES_TOTAL,
            CHAT_SESSIONS_ACTIVE,
            CHAT_SESSIONS_TOTAL,
            CHAT_HISTORY_SIZE,
            CHAT_DISPATCH_DURATION_SECONDS,
            CHAT_SESSION_DURATION_SECONDS,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
