//! # chatline-core
//!
//! Foundation types shared by every chatline crate:
//!
//! - **Session IDs**: [`SessionId`] newtype over a UUID v7 string
//! - **Messages**: inbound [`Submission`] pairs and the immutable [`Message`]
//!   they become once sequenced
//! - **History**: [`HistoryLog`], the append-only (optionally bounded) record
//!   replayed to new sessions
//! - **Errors**: [`ChatError`] and [`TransportError`] via `thiserror`
//! - **Logging**: `tracing` subscriber setup and an in-memory capture helper

#![deny(unsafe_code)]

pub mod errors;
pub mod history;
pub mod ids;
pub mod logging;
pub mod message;

pub use errors::{ChatError, DeliveryFailure, Result, TransportError};
pub use history::HistoryLog;
pub use ids::SessionId;
pub use message::{Message, Submission};
