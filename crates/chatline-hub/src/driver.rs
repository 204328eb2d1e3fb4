//! Session driver: runs one client from handshake through teardown.
//!
//! 1. Registers with the hub (history replay is queued first)
//! 2. Spawns the writer, which forwards queued lines and sends pings
//! 3. Spawns the heartbeat, which closes silent sessions
//! 4. Reads inbound frames and submits them until the session ends
//! 5. Deregisters, flushes the queue within the drain timeout, closes

use std::sync::Arc;
use std::time::{Duration, Instant};

use chatline_core::{ChatError, Submission, TransportError};
use metrics::histogram;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{Span, debug, info, instrument, warn};

use crate::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::hub::Hub;
use crate::metrics::CHAT_SESSION_DURATION_SECONDS;
use crate::session::{CloseReason, Outbound, SessionHandle};
use crate::transport::{FrameSink, FrameSource, InboundFrame};

/// Slack on top of the writer's own drain and close bounds.
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// Run a session over an established transport.
///
/// Returns once the transport is released, with the reason the session
/// ended.
#[instrument(skip_all, fields(session_id = tracing::field::Empty))]
pub async fn run_session<S, K>(hub: Arc<Hub>, mut source: S, mut sink: K) -> CloseReason
where
    S: FrameSource + 'static,
    K: FrameSink + 'static,
{
    let (session, rx) = match hub.connect() {
        Ok(pair) => pair,
        Err(e) => {
            warn!(error = %e, code = e.code(), "session rejected");
            if let Err(close_err) = sink.close().await {
                debug!(error = %close_err, "close after rejection failed");
            }
            return match e {
                ChatError::HubClosed => CloseReason::HubShutdown,
                _ => CloseReason::DeliveryFailed,
            };
        }
    };
    let _ = Span::current().record("session_id", tracing::field::display(&session.id));
    let started = Instant::now();
    let config = hub.config().clone();

    let mut writer = tokio::spawn(write_loop(
        Arc::clone(&session),
        rx,
        sink,
        config.heartbeat_interval,
        config.drain_timeout,
    ));

    let heartbeat_session = Arc::clone(&session);
    let (heartbeat_interval, heartbeat_timeout) = (config.heartbeat_interval, config.heartbeat_timeout);
    let heartbeat = tokio::spawn(async move {
        let cancel = heartbeat_session.cancel_token();
        let result = run_heartbeat(
            Arc::clone(&heartbeat_session),
            heartbeat_interval,
            heartbeat_timeout,
            cancel,
        )
        .await;
        if result == HeartbeatResult::TimedOut {
            warn!(session_id = %heartbeat_session.id, "client unresponsive, disconnecting");
            let _ = heartbeat_session.begin_close(CloseReason::HeartbeatTimeout);
        }
    });

    let reason = read_loop(&hub, &session, &mut source).await;

    hub.disconnect(&session.id, reason);
    let _ = session.begin_close(reason);
    let writer_limit = config.drain_timeout.saturating_mul(2) + WRITER_GRACE;
    match time::timeout(writer_limit, &mut writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "writer task failed"),
        Err(_) => {
            warn!(?writer_limit, "writer did not finish, aborting");
            writer.abort();
            session.mark_closed();
        }
    }
    heartbeat.abort();

    let reason = session.close_reason().unwrap_or(reason);
    histogram!(CHAT_SESSION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    info!(
        reason = reason.as_str(),
        dropped = session.drop_count(),
        "session ended"
    );
    reason
}

/// Read frames until the client leaves or the session is closed elsewhere.
async fn read_loop<S: FrameSource>(
    hub: &Hub,
    session: &SessionHandle,
    source: &mut S,
) -> CloseReason {
    let cancel = session.cancel_token();
    loop {
        tokio::select! {
            frame = source.next_frame() => match frame {
                Some(Ok(frame)) => {
                    session.mark_alive();
                    match frame {
                        InboundFrame::Text(text) => handle_text(hub, session, &text),
                        InboundFrame::Binary(data) => match String::from_utf8(data) {
                            Ok(text) => handle_text(hub, session, &text),
                            Err(e) => {
                                debug!(len = e.as_bytes().len(), "ignoring non-UTF-8 binary frame");
                            }
                        },
                        InboundFrame::Pong => {}
                        InboundFrame::Close => {
                            debug!("client sent close frame");
                            return CloseReason::ClientClosed;
                        }
                    }
                }
                Some(Err(e)) => {
                    debug!(error = %e, "transport read failed");
                    return CloseReason::TransportError;
                }
                None => return CloseReason::ClientClosed,
            },
            () = cancel.cancelled() => {
                return session.close_reason().unwrap_or(CloseReason::HubShutdown);
            }
        }
    }
}

fn handle_text(hub: &Hub, session: &SessionHandle, text: &str) {
    let Some(submission) = Submission::parse(text) else {
        debug!(len = text.len(), "ignoring unparseable frame");
        return;
    };
    match hub.submit(&session.id, submission) {
        Ok(_) => {}
        Err(ChatError::UnknownSession(_)) => debug!("submit after deregistration ignored"),
        Err(e) => debug!(error = %e, "submit failed"),
    }
}

/// Forward queued items to the transport, pinging on every interval.
///
/// Runs until the session starts closing. A write still in flight at that
/// point, the flush of what is already queued and the final close each run
/// under `drain_timeout`, so a peer that stops reading cannot hold the
/// session open. Marks the session `Closed` on return.
async fn write_loop<K: FrameSink>(
    session: Arc<SessionHandle>,
    mut rx: mpsc::Receiver<Outbound>,
    mut sink: K,
    ping_interval: Duration,
    drain_timeout: Duration,
) {
    let cancel = session.cancel_token();
    let mut ping = time::interval(ping_interval.max(Duration::from_millis(1)));
    // Skip the immediate first tick
    let _ = ping.tick().await;

    let mut deadline = None;
    let mut healthy = true;
    loop {
        let result = tokio::select! {
            biased;
            item = rx.recv() => {
                let Some(item) = item else { break };
                let write = write_item(&mut sink, item);
                tokio::pin!(write);
                tokio::select! {
                    result = &mut write => result,
                    () = cancel.cancelled() => {
                        let at = *deadline
                            .get_or_insert_with(|| time::Instant::now() + drain_timeout);
                        if let Ok(result) = time::timeout_at(at, &mut write).await {
                            result
                        } else {
                            debug!(?drain_timeout, "in-flight write abandoned");
                            healthy = false;
                            break;
                        }
                    }
                }
            }
            _ = ping.tick() => tokio::select! {
                result = sink.send_ping() => result,
                () = cancel.cancelled() => break,
            },
            () = cancel.cancelled() => break,
        };
        if let Err(e) = result {
            debug!(error = %e, "transport write failed");
            let _ = session.begin_close(CloseReason::WriteFailed);
            healthy = false;
            break;
        }
    }

    if healthy {
        let at = deadline.unwrap_or_else(|| time::Instant::now() + drain_timeout);
        let flush = async {
            while let Ok(item) = rx.try_recv() {
                write_item(&mut sink, item).await?;
            }
            Ok::<(), TransportError>(())
        };
        match time::timeout_at(at, flush).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "flush on close failed"),
            Err(_) => debug!(?drain_timeout, "flush on close timed out"),
        }
    }
    rx.close();

    match time::timeout(drain_timeout, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "transport close failed"),
        Err(_) => debug!(?drain_timeout, "transport close timed out"),
    }
    session.mark_closed();
}

async fn write_item<K: FrameSink>(sink: &mut K, item: Outbound) -> Result<(), TransportError> {
    for line in item.into_lines() {
        sink.send_text(line).await?;
    }
    Ok(())
}
