//! Canonical endpoint URL resolution.
//!
//! The service historically grew two disagreeing base-URL rules; this
//! module is the single authority both the auth and REST layers use:
//!
//! - A bare absolute host (`https://host`) gets `/api` appended.
//! - A base that already carries a path is preserved as-is.
//! - Joining strips a leading `/api/` from the path so `/api/api/...`
//!   can never be produced.

use crate::settings::ClientConfig;

/// Default WebSocket endpoint when nothing is configured.
const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws/client/";

/// Resolve the REST base URL from config.
///
/// Order: explicit `api_url`, then `<origin>/api`, then the relative
/// `/api` (callers that need an absolute URL must supply one of the
/// first two).
pub fn resolve_api_base(config: &ClientConfig) -> String {
    if let Some(raw) = &config.api_url {
        let no_trail = raw.trim().trim_end_matches('/');
        if !no_trail.is_empty() {
            // Absolute host with no path → append '/api'
            if is_bare_host(no_trail) {
                return format!("{no_trail}/api");
            }
            return no_trail.to_string();
        }
    }
    if let Some(origin) = &config.origin {
        let origin = origin.trim().trim_end_matches('/');
        if !origin.is_empty() {
            return format!("{origin}/api");
        }
    }
    "/api".to_string()
}

/// Join a base and a path with exactly one slash at the seam.
///
/// A leading `/api/` on the path is stripped to avoid `/api/api/...`
/// when the base already ends in `/api`.
pub fn join_url(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let p = strip_api_prefix(&p);
    format!("{b}{p}")
}

/// Resolve the push-channel URL (always ends in `/client/`).
///
/// Order: explicit `ws_url` + `/client/`, then the origin with the
/// scheme swapped (`http→ws`, `https→wss`) + `/ws/client/`, then the
/// localhost default.
pub fn resolve_ws_url(config: &ClientConfig) -> String {
    if let Some(raw) = &config.ws_url {
        let normalized = raw.trim().trim_end_matches('/');
        if !normalized.is_empty() {
            return format!("{normalized}/client/");
        }
    }
    if let Some(origin) = &config.origin {
        let origin = origin.trim().trim_end_matches('/');
        if let Some(rest) = origin.strip_prefix("https://") {
            return format!("wss://{rest}/ws/client/");
        }
        if let Some(rest) = origin.strip_prefix("http://") {
            return format!("ws://{rest}/ws/client/");
        }
    }
    DEFAULT_WS_URL.to_string()
}

/// Append an access token as the `token` query parameter.
///
/// The token is read at connect time by the socket, never baked into the
/// resolved URL.
pub fn ws_url_with_token(ws_url: &str, access_token: &str) -> String {
    let sep = if ws_url.contains('?') { '&' } else { '?' };
    format!("{ws_url}{sep}token={}", urlencoded(access_token))
}

/// `scheme://host` with no path component (ignoring the `//` of the
/// scheme separator).
fn is_bare_host(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(host) => !host.is_empty() && !host.contains('/'),
        None => false,
    }
}

fn strip_api_prefix(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("/api/") {
        format!("/{rest}")
    } else {
        path.to_string()
    }
}

/// Simple URL encoding for query parameter values.
pub fn urlencoded(s: &str) -> String {
    s.replace('%', "%25")
        .replace(' ', "%20")
        .replace('&', "%26")
        .replace('=', "%3D")
        .replace('+', "%2B")
        .replace('/', "%2F")
        .replace(':', "%3A")
        .replace('?', "%3F")
        .replace('#', "%23")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api: Option<&str>, ws: Option<&str>, origin: Option<&str>) -> ClientConfig {
        ClientConfig {
            api_url: api.map(String::from),
            ws_url: ws.map(String::from),
            origin: origin.map(String::from),
        }
    }

    // ── resolve_api_base ────────────────────────────────────────────

    #[test]
    fn bare_host_gets_api_appended() {
        let c = config(Some("https://api.example.com"), None, None);
        assert_eq!(resolve_api_base(&c), "https://api.example.com/api");
    }

    #[test]
    fn explicit_path_preserved() {
        let c = config(Some("https://example.com/v2"), None, None);
        assert_eq!(resolve_api_base(&c), "https://example.com/v2");
    }

    #[test]
    fn trailing_slashes_trimmed() {
        let c = config(Some("https://example.com/api///"), None, None);
        assert_eq!(resolve_api_base(&c), "https://example.com/api");
    }

    #[test]
    fn origin_fallback_appends_api() {
        let c = config(None, None, Some("https://example.com/"));
        assert_eq!(resolve_api_base(&c), "https://example.com/api");
    }

    #[test]
    fn nothing_configured_is_relative_api() {
        assert_eq!(resolve_api_base(&ClientConfig::default()), "/api");
    }

    #[test]
    fn host_with_port_is_still_bare() {
        let c = config(Some("http://localhost:8000"), None, None);
        assert_eq!(resolve_api_base(&c), "http://localhost:8000/api");
    }

    // ── join_url ────────────────────────────────────────────────────

    #[test]
    fn join_adds_missing_slash() {
        assert_eq!(join_url("https://h/api", "tasks/"), "https://h/api/tasks/");
    }

    #[test]
    fn join_trims_base_slash() {
        assert_eq!(join_url("https://h/api/", "/tasks/"), "https://h/api/tasks/");
    }

    #[test]
    fn join_strips_doubled_api_prefix() {
        assert_eq!(
            join_url("https://h/api", "/api/auth/user/"),
            "https://h/api/auth/user/"
        );
    }

    // ── resolve_ws_url ──────────────────────────────────────────────

    #[test]
    fn explicit_ws_url_gets_client_path() {
        let c = config(None, Some("wss://example.com/ws/"), None);
        assert_eq!(resolve_ws_url(&c), "wss://example.com/ws/client/");
    }

    #[test]
    fn https_origin_derives_wss() {
        let c = config(None, None, Some("https://example.com"));
        assert_eq!(resolve_ws_url(&c), "wss://example.com/ws/client/");
    }

    #[test]
    fn http_origin_derives_ws() {
        let c = config(None, None, Some("http://localhost:8000"));
        assert_eq!(resolve_ws_url(&c), "ws://localhost:8000/ws/client/");
    }

    #[test]
    fn nothing_configured_uses_localhost_default() {
        assert_eq!(
            resolve_ws_url(&ClientConfig::default()),
            "ws://localhost:8000/ws/client/"
        );
    }

    // ── token attachment ────────────────────────────────────────────

    #[test]
    fn token_appended_as_query_param() {
        let url = ws_url_with_token("wss://h/ws/client/", "abc123");
        assert_eq!(url, "wss://h/ws/client/?token=abc123");
    }

    #[test]
    fn token_is_url_encoded() {
        let url = ws_url_with_token("wss://h/ws/client/", "a b&c=d");
        assert_eq!(url, "wss://h/ws/client/?token=a%20b%26c%3Dd");
    }

    #[test]
    fn token_appended_with_ampersand_when_query_exists() {
        let url = ws_url_with_token("wss://h/ws/client/?v=1", "t");
        assert_eq!(url, "wss://h/ws/client/?v=1&token=t");
    }

    #[test]
    fn urlencoded_basic() {
        assert_eq!(urlencoded("hello world"), "hello%20world");
        assert_eq!(urlencoded("a&b=c"), "a%26b%3Dc");
        assert_eq!(urlencoded("100%"), "100%25");
    }
}
