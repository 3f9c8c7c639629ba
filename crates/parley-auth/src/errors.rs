//! Auth error types.

/// Errors surfaced by user-initiated auth operations.
///
/// Refresh failures are deliberately absent: they degrade the session
/// instead of propagating.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Login or signup rejected by the server.
    #[error("login failed ({status}): {message}")]
    Credentials {
        /// HTTP status code.
        status: u16,
        /// Server-provided detail, or a generic message.
        message: String,
    },

    /// The server answered with a body that was not the expected JSON.
    #[error("request failed ({status}): unexpected response body")]
    Protocol {
        /// HTTP status code of the offending response.
        status: u16,
    },

    /// A 2xx response missing a required field.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
