//! Session lifecycle orchestration.
//!
//! [`SessionManager`] drives login, signup, refresh, and logout against
//! the token endpoints, keeps the cached user profile, and publishes
//! [`SessionState`] on a watch channel.
//!
//! Failure policy: login and signup report errors to the caller with the
//! server's detail message when present; `refresh()` never does — a
//! failed refresh silently degrades the session to `Anonymous` and the
//! application reacts by observing the state channel.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::watch;

use parley_core::{join_url, resolve_api_base, ClientConfig};

use crate::errors::AuthError;
use crate::store::{Credentials, TokenStore};

/// Where the single logical session currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No credentials held.
    Anonymous,
    /// Credentials held and a user profile cached.
    Authenticated,
    /// A token refresh is in flight.
    Refreshing,
    /// The server rejected the access token; a refresh is warranted.
    Expired,
}

/// Hook invoked just before the session is invalidated.
///
/// Hooks run before the tokens are cleared and before observers see
/// `Anonymous`, which is how "close the socket before going anonymous"
/// is enforced.
type InvalidateHook = Box<dyn Fn() + Send + Sync>;

/// Owner of the login/refresh/logout lifecycle.
///
/// One instance per logical session. All mutation of the credential pair
/// goes through here; the socket and REST layers only read the store.
pub struct SessionManager {
    http: reqwest::Client,
    base: String,
    store: Arc<dyn TokenStore>,
    user: parking_lot::RwLock<Option<Value>>,
    state_tx: watch::Sender<SessionState>,
    hooks: parking_lot::Mutex<Vec<InvalidateHook>>,
}

impl SessionManager {
    /// Build a manager resolving endpoints from `config`.
    pub fn new(config: &ClientConfig, store: Arc<dyn TokenStore>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Anonymous);
        Self {
            http: reqwest::Client::new(),
            base: resolve_api_base(config),
            store,
            user: parking_lot::RwLock::new(None),
            state_tx,
            hooks: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to session state changes.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Current session state snapshot.
    pub fn current_state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Cached user profile, only while `Authenticated`.
    ///
    /// Never makes a network call.
    pub fn current_user(&self) -> Option<Value> {
        if self.current_state() == SessionState::Authenticated {
            self.user.read().clone()
        } else {
            None
        }
    }

    /// Register a hook that runs synchronously before every invalidation
    /// (logout or failed refresh).
    pub fn on_invalidate(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.hooks.lock().push(Box::new(hook));
    }

    // ─── Login ───────────────────────────────────────────────────────────

    /// Authenticate with username/password and fetch the user profile.
    ///
    /// Stores both tokens atomically on success. If the profile fetch
    /// fails afterwards, the whole login fails and the session is
    /// invalidated (hooks, tokens, cached user) — this operation never
    /// partially succeeds.
    #[tracing::instrument(skip_all, fields(username = %username))]
    pub async fn login(&self, username: &str, password: &str) -> Result<Value, AuthError> {
        let body = json!({ "username": username, "password": password });
        let (status, value) = self
            .post_json(&join_url(&self.base, "/token/"), &body)
            .await?;

        if !(200..300).contains(&status) {
            return Err(AuthError::Credentials {
                status,
                message: detail_message(value.as_ref(), "Invalid username or password"),
            });
        }
        let value = value.ok_or(AuthError::Protocol { status })?;

        let access = token_field(&value, "access", "access_token")
            .ok_or_else(|| AuthError::InvalidResponse("no access token returned".into()))?;
        let refresh = token_field(&value, "refresh", "refresh_token");

        // Full atomic replacement of the pair; no half-updated state.
        self.store.set(&Credentials {
            access_token: Some(access),
            refresh_token: refresh,
        });

        match self.fetch_user().await {
            Ok(user) => {
                *self.user.write() = Some(user.clone());
                self.set_state(SessionState::Authenticated);
                Ok(user)
            }
            Err(e) => {
                // A credential write without a resolvable user is a
                // failed login; the rollback is a full invalidation so
                // hooks fire and no open channel outlives the cleared
                // store.
                tracing::warn!("profile fetch after login failed: {e}");
                self.invalidate();
                Err(AuthError::Credentials {
                    status: 0,
                    message: "login succeeded but user info not available".into(),
                })
            }
        }
    }

    /// Register a new account, trying `/auth/signup/` first and falling
    /// back to `/auth/register/`.
    #[tracing::instrument(skip_all)]
    pub async fn signup(&self, data: &Value) -> Result<Value, AuthError> {
        let attempt = self
            .signup_at(&join_url(&self.base, "/auth/signup/"), data)
            .await;
        let value = match attempt {
            Ok(v) => v,
            Err(first) => {
                tracing::debug!("signup endpoint rejected, trying register: {first}");
                self.signup_at(&join_url(&self.base, "/auth/register/"), data)
                    .await?
            }
        };

        let access = token_field(&value, "access", "access_token");
        let user = value.get("user").cloned();
        let (Some(access), Some(user)) = (access, user) else {
            return Err(AuthError::InvalidResponse("signup failed".into()));
        };
        let refresh = token_field(&value, "refresh", "refresh_token");

        self.store.set(&Credentials {
            access_token: Some(access),
            refresh_token: refresh,
        });
        *self.user.write() = Some(user.clone());
        self.set_state(SessionState::Authenticated);
        Ok(user)
    }

    async fn signup_at(&self, url: &str, data: &Value) -> Result<Value, AuthError> {
        let (status, value) = self.post_json(url, data).await?;
        if !(200..300).contains(&status) {
            return Err(AuthError::Credentials {
                status,
                message: detail_message(value.as_ref(), "Signup failed"),
            });
        }
        value.ok_or(AuthError::Protocol { status })
    }

    // ─── Refresh ─────────────────────────────────────────────────────────

    /// Mint a new access token from the stored refresh token.
    ///
    /// No stored refresh token is a no-op, not a failure. Any failure of
    /// the refresh call itself invalidates the session instead of
    /// returning an error.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self) {
        let creds = self.store.get();
        let Some(refresh) = creds.refresh_token.clone() else {
            // Nothing to refresh; leave state untouched.
            return;
        };

        self.set_state(SessionState::Refreshing);

        let body = json!({ "refresh": refresh });
        let outcome = self
            .post_json(&join_url(&self.base, "/token/refresh/"), &body)
            .await;

        let value = match outcome {
            Ok((status, value)) if (200..300).contains(&status) => value,
            Ok((status, _)) => {
                tracing::warn!(status, "token refresh rejected, invalidating session");
                self.invalidate();
                return;
            }
            Err(e) => {
                tracing::warn!("token refresh failed: {e}");
                self.invalidate();
                return;
            }
        };

        let Some(access) =
            value.as_ref().and_then(|v| token_field(v, "access", "access_token"))
        else {
            tracing::warn!("refresh response carried no access token, invalidating session");
            self.invalidate();
            return;
        };

        // Refresh token is preserved unless the server reissued one.
        let new_refresh = value
            .as_ref()
            .and_then(|v| token_field(v, "refresh", "refresh_token"))
            .or(Some(refresh));
        self.store.set(&Credentials {
            access_token: Some(access),
            refresh_token: new_refresh,
        });
        self.set_state(SessionState::Authenticated);
    }

    // ─── Logout / invalidation ───────────────────────────────────────────

    /// Drop the session unconditionally. No network access, idempotent.
    pub fn logout(&self) {
        self.invalidate();
    }

    /// Flag the access token as rejected by the server (observed 401).
    ///
    /// Observers of the state channel should react by calling
    /// [`Self::refresh`].
    pub fn mark_expired(&self) {
        if self.current_state() == SessionState::Authenticated {
            self.set_state(SessionState::Expired);
        }
    }

    /// Re-establish a session from persisted tokens on startup.
    ///
    /// Fetches the profile with the stored access token; on failure the
    /// session simply stays `Anonymous` (the tokens are left in place so
    /// a later `refresh()` can still try).
    #[tracing::instrument(skip_all)]
    pub async fn restore(&self) -> Option<Value> {
        let creds = self.store.get();
        creds.access_token.as_ref()?;

        match self.fetch_user().await {
            Ok(user) => {
                *self.user.write() = Some(user.clone());
                self.set_state(SessionState::Authenticated);
                Some(user)
            }
            Err(e) => {
                tracing::debug!("session restore failed: {e}");
                None
            }
        }
    }

    fn invalidate(&self) {
        // Hooks first: any open realtime channel must be closed before
        // observers can see Anonymous.
        for hook in self.hooks.lock().iter() {
            hook();
        }
        self.store.clear();
        *self.user.write() = None;
        self.set_state(SessionState::Anonymous);
    }

    fn set_state(&self, state: SessionState) {
        let _ = self.state_tx.send_replace(state);
    }

    // ─── HTTP helpers ────────────────────────────────────────────────────

    async fn fetch_user(&self) -> Result<Value, AuthError> {
        let access = self
            .store
            .get()
            .access_token
            .ok_or_else(|| AuthError::InvalidResponse("no access token stored".into()))?;

        let resp = self
            .http
            .get(join_url(&self.base, "/auth/user/"))
            .bearer_auth(access)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(AuthError::Protocol { status });
        }
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|_| AuthError::Protocol { status })
    }

    /// POST a JSON body, returning the status and the parsed body when
    /// it is JSON (`None` otherwise).
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
    ) -> Result<(u16, Option<Value>), AuthError> {
        let resp = self.http.post(url).json(body).send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        Ok((status, serde_json::from_str(&text).ok()))
    }
}

/// Pick the first present of two alternative token field names.
fn token_field(value: &Value, primary: &str, alternate: &str) -> Option<String> {
    value
        .get(primary)
        .or_else(|| value.get(alternate))
        .and_then(Value::as_str)
        .map(String::from)
}

/// Server `detail`/`error` field, else the fallback message.
fn detail_message(value: Option<&Value>, fallback: &str) -> String {
    value
        .and_then(|v| v.get("detail").or_else(|| v.get("error")))
        .and_then(Value::as_str)
        .map_or_else(|| fallback.to_string(), String::from)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
