//! # chatline-hub
//!
//! The message broadcast hub, independent of any wire protocol.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `session` | Per-connection handle: outbound queue, lifecycle state, liveness |
//! | `registry` | Set of sessions eligible for broadcast |
//! | `hub` | Serialized append + fan-out, history replay on connect |
//! | `transport` | `FrameSource` / `FrameSink` boundary and an in-memory transport |
//! | `driver` | Runs one session: reader, writer, heartbeat, teardown |
//! | `heartbeat` | Ping/pong liveness monitoring |
//!
//! ## Data Flow
//!
//! transport → `driver` → `Hub::submit` → `HistoryLog::append` +
//! `ConnectionRegistry::for_each_active` → every session's queue → `driver`
//! writer → transport.

#![deny(unsafe_code)]

pub mod config;
pub mod driver;
pub mod heartbeat;
pub mod hub;
pub mod metrics;
pub mod registry;
pub mod session;
pub mod transport;

pub use config::HubConfig;
pub use driver::run_session;
pub use hub::Hub;
pub use registry::ConnectionRegistry;
pub use session::{CloseReason, Outbound, SessionHandle, SessionState};
pub use transport::{FrameSink, FrameSource, InboundFrame};
