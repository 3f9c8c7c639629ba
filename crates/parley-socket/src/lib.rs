//! # parley-socket
//!
//! The resilient real-time channel: a WebSocket client that survives
//! network drops, server restarts, and token rotation without losing its
//! place or spamming reconnect attempts.
//!
//! The reconnect logic is a pure transition function over
//! [`ConnectionState`] ([`state::transition`]); the tokio driver in
//! [`socket`] only interprets its effects, so the state machine is fully
//! testable without timers or IO.

#![deny(unsafe_code)]

pub mod backoff;
pub mod socket;
pub mod state;

pub use backoff::BackoffConfig;
pub use socket::ResilientSocket;
pub use state::{ConnectionState, Effect, SocketEvent};
