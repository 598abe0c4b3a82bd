//! Persistent socket client for upstream notifications.
//!
//! One client task per channel holds a stream socket to the notifier,
//! drains a bounded queue of JSON-encoded events, and survives connection
//! loss with a one-slot replay buffer: delivery is at-least-once for the
//! most recent failed message, never exactly-once.

mod client;
mod error;

pub use client::{EventClient, RECONNECT_DELAY};
pub use error::{NotifyError, NotifyResult};
