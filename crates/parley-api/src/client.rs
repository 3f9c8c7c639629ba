//! The `httpCall` collaborator: one method, fixed header policy.

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;

use parley_auth::TokenStore;
use parley_core::{join_url, resolve_api_base, ClientConfig};

use crate::errors::ApiError;

/// Hook invoked when the server rejects the access token (401).
type UnauthorizedHook = Box<dyn Fn() + Send + Sync>;

/// REST client for the Parley service.
///
/// Reads the access token from the injected store on every call; never
/// caches it.
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    store: Arc<dyn TokenStore>,
    on_unauthorized: parking_lot::Mutex<Option<UnauthorizedHook>>,
}

impl ApiClient {
    /// Build a client resolving the base URL from `config`.
    pub fn new(config: &ClientConfig, store: Arc<dyn TokenStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: resolve_api_base(config),
            store,
            on_unauthorized: parking_lot::Mutex::new(None),
        }
    }

    /// Resolved REST base URL.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Register the hook that fires when a call is rejected with 401.
    pub fn on_unauthorized(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_unauthorized.lock() = Some(Box::new(hook));
    }

    /// Perform one REST call.
    ///
    /// Attaches `Authorization: Bearer` when a token is stored. Non-2xx
    /// responses surface the server's `detail`/`error` field when the
    /// body is JSON, the raw body text otherwise. A 2xx response with a
    /// non-JSON body yields `Value::Null`.
    #[tracing::instrument(skip_all, fields(%method, path))]
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let url = join_url(&self.base, path);
        let mut request = self.http.request(method, &url);
        if let Some(access) = self.store.get().access_token {
            request = request.bearer_auth(access);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        if !(200..300).contains(&status) {
            if status == 401 {
                if let Some(hook) = self.on_unauthorized.lock().as_ref() {
                    hook();
                }
            }
            return Err(ApiError::Status {
                status,
                message: rejection_message(status, &text),
            });
        }

        Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
    }
}

/// Server `detail`/`error` field, else the raw body, else a generic
/// message carrying the status code.
fn rejection_message(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(detail) = value
            .get("detail")
            .or_else(|| value.get("error"))
            .and_then(Value::as_str)
        {
            return detail.to_string();
        }
    }
    if body.trim().is_empty() {
        format!("Request failed ({status})")
    } else {
        body.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
