//! # parley-client
//!
//! The assembled Parley client: one [`ParleyClient`] wires the session
//! manager, the resilient socket, the event router, and the REST client
//! around a single injected token store.
//!
//! Cross-component invariants enforced here:
//! - any open realtime channel is closed *before* session observers see
//!   `Anonymous` (logout or failed refresh);
//! - a 401 on a REST call flags the session `Expired` so observers can
//!   trigger a refresh.

#![deny(unsafe_code)]

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

use parley_api::ApiClient;
use parley_auth::SessionManager;
use parley_core::ClientConfig;
use parley_events::EventRouter;
use parley_socket::ResilientSocket;

pub use parley_api::ApiError;
pub use parley_auth::{
    AuthError, Credentials, FileTokenStore, MemoryTokenStore, SessionState, TokenStore,
};
pub use parley_core::{init_logging, ClientConfig as Config};
pub use parley_socket::{BackoffConfig, ConnectionState};

/// The assembled client. One instance per logical session.
pub struct ParleyClient {
    session: Arc<SessionManager>,
    api: Arc<ApiClient>,
    socket: Arc<ResilientSocket>,
    router: Arc<EventRouter>,
}

impl ParleyClient {
    /// Wire up a client around `store`.
    pub fn new(config: &ClientConfig, store: Arc<dyn TokenStore>) -> Self {
        Self::with_backoff(config, store, BackoffConfig::default())
    }

    /// Same, with custom reconnect timing.
    pub fn with_backoff(
        config: &ClientConfig,
        store: Arc<dyn TokenStore>,
        backoff: BackoffConfig,
    ) -> Self {
        let router = EventRouter::new();
        let session = Arc::new(SessionManager::new(config, Arc::clone(&store)));
        let api = Arc::new(ApiClient::new(config, Arc::clone(&store)));
        let socket = Arc::new(
            ResilientSocket::new(config, store, Arc::clone(&router)).with_backoff(backoff),
        );

        // Invalidation closes the channel before observers can see
        // Anonymous.
        let socket_for_hook = Arc::clone(&socket);
        session.on_invalidate(move || socket_for_hook.stop());

        // A rejected access token flags the session for refresh.
        let session_for_hook = Arc::clone(&session);
        api.on_unauthorized(move || session_for_hook.mark_expired());

        Self {
            session,
            api,
            socket,
            router,
        }
    }

    /// Session lifecycle (login, refresh, logout, cached user).
    #[must_use]
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// REST endpoints.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Subscription point for decoded push events.
    #[must_use]
    pub fn events(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// Open the realtime channel. Call once a session exists; with no
    /// stored token the socket settles back at `Idle`.
    pub fn connect(&self) {
        self.socket.start();
    }

    /// Close the realtime channel.
    pub fn disconnect(&self) {
        self.socket.stop();
    }

    /// Transmit a payload over the realtime channel (dropped unless the
    /// channel is open).
    pub fn send(&self, payload: &Value) {
        self.socket.send(payload);
    }

    /// Observe connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.socket.state()
    }

    /// Observe session state changes.
    pub fn session_state(&self) -> watch::Receiver<SessionState> {
        self.session.state()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
