//! REST error types.

/// Errors from REST calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("request failed ({status}): {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Server `detail`/`error` field, raw body text, or a generic
        /// message when the body was empty.
        message: String,
    },
}

impl ApiError {
    /// Status code for rejected requests, `None` for transport errors.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Status { status, .. } => Some(*status),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
