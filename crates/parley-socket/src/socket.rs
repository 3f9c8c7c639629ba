//! Resilient WebSocket driver.
//!
//! [`ResilientSocket`] owns one logical connection to the push endpoint.
//! A spawned driver task walks the pure state machine in
//! [`crate::state`], re-reading the token store on every connect attempt
//! so a token refreshed during backoff is picked up automatically.
//!
//! Stop semantics: `stop()` aborts the driver task, which is what
//! guarantees a pending backoff timer can never fire afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use parley_auth::TokenStore;
use parley_core::urls::ws_url_with_token;
use parley_core::{resolve_ws_url, ClientConfig};
use parley_events::EventRouter;

use crate::backoff::BackoffConfig;
use crate::state::{transition, ConnectionState, SocketEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A long-lived duplex channel to the push endpoint.
///
/// Exactly one driver runs per instance; calling [`Self::start`] while
/// one is live fully stops it first.
pub struct ResilientSocket {
    ws_url: String,
    store: Arc<dyn TokenStore>,
    router: Arc<EventRouter>,
    backoff: BackoffConfig,
    state_tx: watch::Sender<ConnectionState>,
    active: parking_lot::Mutex<Option<Active>>,
}

struct Active {
    out_tx: mpsc::UnboundedSender<Value>,
    task: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
}

impl ResilientSocket {
    /// Build a socket for the push endpoint resolved from `config`.
    ///
    /// Parsed inbound frames are handed to `router`.
    pub fn new(
        config: &ClientConfig,
        store: Arc<dyn TokenStore>,
        router: Arc<EventRouter>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            ws_url: resolve_ws_url(config),
            store,
            router,
            backoff: BackoffConfig::default(),
            state_tx,
            active: parking_lot::Mutex::new(None),
        }
    }

    /// Override the reconnect timing (tests, aggressive environments).
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Subscribe to connection state changes, independent of the
    /// message stream.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Current state snapshot.
    pub fn current_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Start (or restart) the connection driver.
    ///
    /// Must be called from within a tokio runtime. Callers should start
    /// the socket only once a session exists; with no stored token the
    /// driver settles back at `Idle` without dialing.
    pub fn start(&self) {
        self.stop();

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let driver = Driver {
            ws_url: self.ws_url.clone(),
            store: Arc::clone(&self.store),
            router: Arc::clone(&self.router),
            backoff: self.backoff,
            state_tx: self.state_tx.clone(),
            shutdown: Arc::clone(&shutdown),
            out_rx,
        };
        let task = tokio::spawn(driver.run());
        *self.active.lock() = Some(Active {
            out_tx,
            task,
            shutdown,
        });
    }

    /// Stop the driver and cancel any pending reconnect.
    ///
    /// Synchronous and idempotent; after it returns no reconnect can
    /// fire.
    pub fn stop(&self) {
        let Some(active) = self.active.lock().take() else {
            return;
        };
        // Raised before the abort: a driver caught between awaits can
        // still run briefly, and must not publish over the Idle written
        // below.
        active.shutdown.store(true, Ordering::Release);
        active.task.abort();

        let now = Instant::now();
        let (state, _) = transition(self.current_state(), SocketEvent::Stop, now, &self.backoff);
        let _ = self.state_tx.send_replace(state);
        if state == ConnectionState::Closing {
            let (state, _) = transition(state, SocketEvent::Stopped, now, &self.backoff);
            let _ = self.state_tx.send_replace(state);
        }
    }

    /// Serialize and transmit `payload`, only while `Open`.
    ///
    /// Calls in any other state are dropped silently — callers needing
    /// guaranteed delivery must buffer upstream.
    pub fn send(&self, payload: &Value) {
        let guard = self.active.lock();
        let Some(active) = guard.as_ref() else {
            tracing::debug!("dropping outbound frame: socket not started");
            return;
        };
        if !self.current_state().is_open() {
            tracing::debug!("dropping outbound frame: channel not open");
            return;
        }
        let _ = active.out_tx.send(payload.clone());
    }
}

impl Drop for ResilientSocket {
    fn drop(&mut self) {
        self.stop();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Driver task
// ─────────────────────────────────────────────────────────────────────────────

struct Driver {
    ws_url: String,
    store: Arc<dyn TokenStore>,
    router: Arc<EventRouter>,
    backoff: BackoffConfig,
    state_tx: watch::Sender<ConnectionState>,
    shutdown: Arc<AtomicBool>,
    out_rx: mpsc::UnboundedReceiver<Value>,
}

impl Driver {
    /// Publish a state change unless `stop()` has already taken over the
    /// channel; after shutdown the `Idle` it wrote is final.
    fn publish(&self, state: ConnectionState) {
        if !self.shutdown.load(Ordering::Acquire) {
            let _ = self.state_tx.send_replace(state);
        }
    }

    async fn run(mut self) {
        let mut state = ConnectionState::Idle;
        let mut next_event = Some(SocketEvent::Start);

        while let Some(event) = next_event.take() {
            let (new_state, effects) =
                transition(state, event, Instant::now(), &self.backoff);
            state = new_state;
            self.publish(state);

            for effect in effects {
                match effect {
                    crate::state::Effect::Connect => {
                        next_event = Some(self.connect_and_pump(&mut state).await);
                    }
                    crate::state::Effect::ScheduleRetry => {
                        if let ConnectionState::Backoff { retry_at, .. } = state {
                            tokio::time::sleep_until(retry_at.into()).await;
                            next_event = Some(SocketEvent::RetryDue);
                        }
                    }
                    // Stop is enforced from outside via task abort.
                    crate::state::Effect::CancelRetry
                    | crate::state::Effect::CloseTransport => {}
                }
            }
        }
    }

    /// One connection attempt: dial with the current token, then pump
    /// frames until the channel dies.
    async fn connect_and_pump(&mut self, state: &mut ConnectionState) -> SocketEvent {
        // Re-read the store on every attempt; a token refreshed during
        // backoff is picked up here.
        let Some(token) = self.store.get().access_token else {
            tracing::info!("no access token, not connecting");
            return SocketEvent::CredentialsMissing;
        };

        let url = ws_url_with_token(&self.ws_url, &token);
        match connect_async(url.as_str()).await {
            Ok((ws, _)) => {
                let (open, _) =
                    transition(*state, SocketEvent::HandshakeOk, Instant::now(), &self.backoff);
                *state = open;
                self.publish(*state);
                tracing::info!(url = %self.ws_url, "realtime channel open");

                self.pump(ws).await;

                // Frames queued while the channel was dying are not
                // delivered on the next connection.
                while self.out_rx.try_recv().is_ok() {}
                tracing::info!("realtime channel lost");
                SocketEvent::ConnectionLost
            }
            Err(e) => {
                tracing::warn!("handshake failed: {e}");
                SocketEvent::ConnectionLost
            }
        }
    }

    async fn pump(&mut self, ws: WsStream) {
        let (mut ws_tx, mut ws_rx) = ws.split();
        loop {
            tokio::select! {
                out = self.out_rx.recv() => {
                    let Some(payload) = out else { break };
                    let text = payload.to_string();
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<Value>(&text) {
                                Ok(value) => self.router.dispatch(&value),
                                // Malformed frames are dropped without
                                // touching the connection.
                                Err(e) => {
                                    tracing::debug!("dropping malformed frame: {e}");
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        // Ping/pong are answered by the transport;
                        // binary frames are not part of the protocol.
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!("socket error: {e}");
                            break;
                        }
                    }
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use parley_auth::{Credentials, MemoryTokenStore};
    use serde_json::json;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::handshake::server::{
        ErrorResponse, Request, Response,
    };

    /// One accepted server-side connection.
    struct ServerConn {
        uri: String,
        ws: WebSocketStream<TcpStream>,
    }

    /// Local WebSocket server handing accepted connections to the test.
    async fn spawn_server() -> (String, mpsc::UnboundedReceiver<ServerConn>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();

        let _server = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let uri = Arc::new(parking_lot::Mutex::new(String::new()));
                let uri_cb = Arc::clone(&uri);
                let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    *uri_cb.lock() = req.uri().to_string();
                    Ok(resp)
                };
                let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await
                else {
                    continue;
                };
                let conn = ServerConn {
                    uri: uri.lock().clone(),
                    ws,
                };
                if conn_tx.send(conn).is_err() {
                    break;
                }
            }
        });

        (format!("ws://{addr}"), conn_rx)
    }

    fn socket_for(
        ws_base: &str,
        store: Arc<MemoryTokenStore>,
        router: Arc<EventRouter>,
        base_delay_ms: u64,
    ) -> ResilientSocket {
        let config = ClientConfig {
            api_url: None,
            ws_url: Some(format!("{ws_base}/ws")),
            origin: None,
        };
        ResilientSocket::new(&config, store, router).with_backoff(BackoffConfig {
            base_delay_ms,
            max_delay_ms: 30_000,
            max_attempt: 6,
        })
    }

    async fn wait_for_state(
        rx: &mut watch::Receiver<ConnectionState>,
        pred: impl Fn(&ConnectionState) -> bool,
    ) -> ConnectionState {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let current = *rx.borrow_and_update();
                if pred(&current) {
                    return current;
                }
                rx.changed().await.expect("state channel closed");
            }
        })
        .await
        .expect("timed out waiting for connection state")
    }

    async fn next_conn(rx: &mut mpsc::UnboundedReceiver<ServerConn>) -> ServerConn {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for connection")
            .expect("server task gone")
    }

    // ── connect / token handling ────────────────────────────────────

    #[tokio::test]
    async fn no_token_means_no_connection() {
        let (ws_base, mut conns) = spawn_server().await;
        let store = Arc::new(MemoryTokenStore::new());
        let socket = socket_for(&ws_base, store, EventRouter::new(), 50);

        socket.start();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(socket.current_state(), ConnectionState::Idle);
        assert!(conns.try_recv().is_err(), "must not dial without a token");
    }

    #[tokio::test]
    async fn connects_with_current_token_in_query() {
        let (ws_base, mut conns) = spawn_server().await;
        let store = Arc::new(MemoryTokenStore::new());
        store.set(&Credentials::new("T1", "R1"));
        let socket = socket_for(&ws_base, store, EventRouter::new(), 50);
        let mut state_rx = socket.state();

        socket.start();
        let conn = next_conn(&mut conns).await;

        assert_eq!(conn.uri, "/ws/client/?token=T1");
        let state = wait_for_state(&mut state_rx, ConnectionState::is_open).await;
        assert_eq!(state, ConnectionState::Open);
    }

    // ── inbound frames ──────────────────────────────────────────────

    #[tokio::test]
    async fn parsed_frames_reach_router_and_malformed_are_dropped() {
        let (ws_base, mut conns) = spawn_server().await;
        let store = Arc::new(MemoryTokenStore::new());
        store.set(&Credentials::new("T1", "R1"));

        let router = EventRouter::new();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let _sub = router.subscribe(move |msg| {
            seen_tx.send(msg.clone()).map_err(Into::into)
        });

        let socket = socket_for(&ws_base, store, Arc::clone(&router), 50);
        let mut state_rx = socket.state();
        socket.start();

        let mut conn = next_conn(&mut conns).await;
        let _ = wait_for_state(&mut state_rx, ConnectionState::is_open).await;

        conn.ws
            .send(Message::Text(r#"{"type":"notification","id":9}"#.into()))
            .await
            .unwrap();
        let first = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first["type"], "notification");

        // Malformed frame: dropped, connection stays open, nothing
        // dispatched.
        conn.ws
            .send(Message::Text("{not json".into()))
            .await
            .unwrap();
        conn.ws
            .send(Message::Text(r#"{"type":"chat_message"}"#.into()))
            .await
            .unwrap();

        let second = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            second["type"], "chat_message",
            "malformed frame must not reach subscribers"
        );
        assert!(socket.current_state().is_open());
    }

    // ── outbound frames ─────────────────────────────────────────────

    #[tokio::test]
    async fn send_transmits_while_open() {
        let (ws_base, mut conns) = spawn_server().await;
        let store = Arc::new(MemoryTokenStore::new());
        store.set(&Credentials::new("T1", "R1"));
        let socket = socket_for(&ws_base, store, EventRouter::new(), 50);
        let mut state_rx = socket.state();

        socket.start();
        let mut conn = next_conn(&mut conns).await;
        let _ = wait_for_state(&mut state_rx, ConnectionState::is_open).await;

        socket.send(&json!({ "type": "typing", "task": 3 }));

        let msg = tokio::time::timeout(Duration::from_secs(5), conn.ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let Message::Text(text) = msg else {
            panic!("expected text frame, got {msg:?}");
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "typing");
    }

    #[tokio::test]
    async fn sends_while_not_open_produce_no_frames() {
        let (ws_base, mut conns) = spawn_server().await;
        let store = Arc::new(MemoryTokenStore::new());
        store.set(&Credentials::new("T1", "R1"));
        let socket = socket_for(&ws_base, store, EventRouter::new(), 100);
        let mut state_rx = socket.state();

        socket.start();
        let mut conn = next_conn(&mut conns).await;
        let _ = wait_for_state(&mut state_rx, ConnectionState::is_open).await;

        conn.ws.close(None).await.unwrap();
        let _ = wait_for_state(&mut state_rx, |s| {
            matches!(s, ConnectionState::Backoff { .. })
        })
        .await;

        // Two sends during backoff: both silently dropped.
        socket.send(&json!({ "n": 1 }));
        socket.send(&json!({ "n": 2 }));

        let mut conn2 = next_conn(&mut conns).await;
        let _ = wait_for_state(&mut state_rx, ConnectionState::is_open).await;

        let unexpected =
            tokio::time::timeout(Duration::from_millis(300), conn2.ws.next()).await;
        assert!(
            unexpected.is_err(),
            "no outbound frame may survive a backoff period"
        );
    }

    // ── reconnect ───────────────────────────────────────────────────

    #[tokio::test]
    async fn reconnects_after_close_with_fresh_token() {
        let (ws_base, mut conns) = spawn_server().await;
        let store = Arc::new(MemoryTokenStore::new());
        store.set(&Credentials::new("T1", "R1"));
        let socket = socket_for(&ws_base, Arc::clone(&store), EventRouter::new(), 50);
        let mut state_rx = socket.state();

        socket.start();
        let mut conn = next_conn(&mut conns).await;
        let _ = wait_for_state(&mut state_rx, ConnectionState::is_open).await;

        // Token rotated while the channel dies; the retry must pick up
        // the new one.
        store.set(&Credentials::new("T2", "R1"));
        conn.ws.close(None).await.unwrap();

        let conn2 = next_conn(&mut conns).await;
        assert_eq!(conn2.uri, "/ws/client/?token=T2");
        let _ = wait_for_state(&mut state_rx, ConnectionState::is_open).await;
    }

    #[tokio::test]
    async fn first_reconnect_is_attempt_one() {
        let (ws_base, mut conns) = spawn_server().await;
        let store = Arc::new(MemoryTokenStore::new());
        store.set(&Credentials::new("T1", "R1"));
        // Long delay so Backoff is reliably observable.
        let socket = socket_for(&ws_base, store, EventRouter::new(), 400);
        let mut state_rx = socket.state();

        socket.start();
        let mut conn = next_conn(&mut conns).await;
        let _ = wait_for_state(&mut state_rx, ConnectionState::is_open).await;

        conn.ws.close(None).await.unwrap();
        let state = wait_for_state(&mut state_rx, |s| {
            matches!(s, ConnectionState::Backoff { .. })
        })
        .await;
        assert_matches!(state, ConnectionState::Backoff { attempt: 1, .. });
    }

    // ── stop ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn stop_during_backoff_prevents_reconnect() {
        let (ws_base, mut conns) = spawn_server().await;
        let store = Arc::new(MemoryTokenStore::new());
        store.set(&Credentials::new("T1", "R1"));
        let socket = socket_for(&ws_base, store, EventRouter::new(), 200);
        let mut state_rx = socket.state();

        socket.start();
        let mut conn = next_conn(&mut conns).await;
        let _ = wait_for_state(&mut state_rx, ConnectionState::is_open).await;

        conn.ws.close(None).await.unwrap();
        let _ = wait_for_state(&mut state_rx, |s| {
            matches!(s, ConnectionState::Backoff { .. })
        })
        .await;

        socket.stop();
        assert_eq!(socket.current_state(), ConnectionState::Idle);

        // Well past the retry deadline: the cancelled timer must not
        // have fired.
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(conns.try_recv().is_err(), "reconnect fired after stop");
        assert_eq!(socket.current_state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn stop_while_open_ends_idle_and_is_idempotent() {
        let (ws_base, mut conns) = spawn_server().await;
        let store = Arc::new(MemoryTokenStore::new());
        store.set(&Credentials::new("T1", "R1"));
        let socket = socket_for(&ws_base, store, EventRouter::new(), 50);
        let mut state_rx = socket.state();

        socket.start();
        let _conn = next_conn(&mut conns).await;
        let _ = wait_for_state(&mut state_rx, ConnectionState::is_open).await;

        socket.stop();
        assert_eq!(socket.current_state(), ConnectionState::Idle);
        socket.stop();
        assert_eq!(socket.current_state(), ConnectionState::Idle);

        // A driver still winding down after the abort must not publish
        // over the final Idle.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(socket.current_state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn restart_replaces_existing_connection() {
        let (ws_base, mut conns) = spawn_server().await;
        let store = Arc::new(MemoryTokenStore::new());
        store.set(&Credentials::new("T1", "R1"));
        let socket = socket_for(&ws_base, store, EventRouter::new(), 50);
        let mut state_rx = socket.state();

        socket.start();
        let mut conn1 = next_conn(&mut conns).await;
        let _ = wait_for_state(&mut state_rx, ConnectionState::is_open).await;

        socket.start();
        let _conn2 = next_conn(&mut conns).await;
        let _ = wait_for_state(&mut state_rx, ConnectionState::is_open).await;

        // The first connection was torn down; its stream ends.
        let end = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match conn1.ws.next().await {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(end.is_ok(), "old connection must be closed on restart");
    }
}
