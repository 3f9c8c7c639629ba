//! Connection state machine.
//!
//! `(state, event) -> (state, effects)` with no timers or IO inside, so
//! every reconnect rule is testable synchronously. The driver in
//! [`crate::socket`] interprets the effects.
//!
//! Invariants encoded here:
//! - the attempt counter resets to 0 only on reaching `Open`;
//! - `Stop` from any live state ends at `Idle` and cancels any pending
//!   retry, so no reconnect can fire after an explicit stop;
//! - missing credentials at connect time settle the machine at `Idle`
//!   rather than dialing out.

use std::time::Instant;

use crate::backoff::BackoffConfig;

/// Where the logical connection currently stands.
///
/// `Connecting` carries the number of failures in the current streak so
/// a failed handshake continues the streak instead of restarting it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not running.
    Idle,
    /// Handshake in flight; `attempt` failures so far in this streak.
    Connecting {
        /// Failures in the current unbroken streak.
        attempt: u32,
    },
    /// Channel established.
    Open,
    /// Explicit stop in progress.
    Closing,
    /// Waiting to retry.
    Backoff {
        /// 1-based attempt number for the upcoming retry.
        attempt: u32,
        /// When the retry fires.
        retry_at: Instant,
    },
}

impl ConnectionState {
    /// True for `Open`.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Inputs to the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketEvent {
    /// Explicit start.
    Start,
    /// Handshake completed.
    HandshakeOk,
    /// Handshake failed, or the channel closed/errored while open.
    ConnectionLost,
    /// No access token available at connect time.
    CredentialsMissing,
    /// The backoff deadline arrived.
    RetryDue,
    /// Explicit stop.
    Stop,
    /// Transport teardown after `Stop` finished.
    Stopped,
}

/// Side effects the driver must perform after a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Dial the endpoint with the current access token.
    Connect,
    /// Arm the retry timer for the `Backoff` deadline.
    ScheduleRetry,
    /// Disarm a pending retry timer.
    CancelRetry,
    /// Close the underlying transport.
    CloseTransport,
}

/// Apply one event.
///
/// Unexpected events for the current state are ignored (state returned
/// unchanged, no effects).
#[must_use]
pub fn transition(
    state: ConnectionState,
    event: SocketEvent,
    now: Instant,
    backoff: &BackoffConfig,
) -> (ConnectionState, Vec<Effect>) {
    use ConnectionState as S;
    use SocketEvent as E;

    match (state, event) {
        (S::Idle, E::Start) => (S::Connecting { attempt: 0 }, vec![Effect::Connect]),

        (S::Connecting { .. }, E::HandshakeOk) => (S::Open, vec![]),

        (S::Connecting { attempt }, E::ConnectionLost) => {
            enter_backoff(attempt, now, backoff)
        }
        // A fresh Open resets the streak, so the first reconnect is
        // attempt 1.
        (S::Open, E::ConnectionLost) => enter_backoff(0, now, backoff),

        (S::Connecting { .. }, E::CredentialsMissing) => (S::Idle, vec![]),

        (S::Backoff { attempt, .. }, E::RetryDue) => {
            (S::Connecting { attempt }, vec![Effect::Connect])
        }

        (S::Connecting { .. } | S::Open, E::Stop) => {
            (S::Closing, vec![Effect::CloseTransport])
        }
        (S::Backoff { .. }, E::Stop) => (S::Idle, vec![Effect::CancelRetry]),
        (S::Closing, E::Stopped) => (S::Idle, vec![]),

        (state, event) => {
            tracing::debug!(?state, ?event, "ignoring event in current state");
            (state, vec![])
        }
    }
}

fn enter_backoff(
    streak: u32,
    now: Instant,
    backoff: &BackoffConfig,
) -> (ConnectionState, Vec<Effect>) {
    let attempt = backoff.next_attempt(streak);
    let retry_at = now + backoff.delay(attempt);
    (
        ConnectionState::Backoff { attempt, retry_at },
        vec![Effect::ScheduleRetry],
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
