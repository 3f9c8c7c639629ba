//! Token storage.
//!
//! The store owns the two credential strings and nothing else. Calls are
//! synchronous and idempotent; `set` replaces both fields in one write so
//! no reader can observe a half-updated pair.
//!
//! [`FileTokenStore`] persists to a small JSON file (two fixed keys plus
//! a timestamp) with 0o600 permissions, tolerating a missing or corrupt
//! file by starting empty.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default token file name.
const TOKEN_FILE_NAME: &str = "tokens.json";

/// The session's credential pair. Both fields absent means logged out.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Short-lived credential attached to every request/connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Longer-lived credential used solely to mint a new access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Credentials {
    /// Both tokens present.
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access_token: Some(access.into()),
            refresh_token: Some(refresh.into()),
        }
    }

    /// Logged-out state: neither token held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// Owner of the credential pair.
///
/// Injected explicitly into the session manager and the socket so tests
/// can substitute a fake.
pub trait TokenStore: Send + Sync {
    /// Current credentials; empty when logged out.
    fn get(&self) -> Credentials;
    /// Replace both fields atomically.
    fn set(&self, credentials: &Credentials);
    /// Drop both fields. `clear()` then `get()` always yields empty.
    fn clear(&self);
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────────────────────────

/// Ephemeral store for tests and non-persistent sessions.
#[derive(Default)]
pub struct MemoryTokenStore {
    credentials: parking_lot::RwLock<Credentials>,
}

impl MemoryTokenStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Credentials {
        self.credentials.read().clone()
    }

    fn set(&self, credentials: &Credentials) {
        *self.credentials.write() = credentials.clone();
    }

    fn clear(&self) {
        *self.credentials.write() = Credentials::default();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File-backed store
// ─────────────────────────────────────────────────────────────────────────────

/// On-disk token file shape.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTokens {
    #[serde(flatten)]
    credentials: Credentials,
    #[serde(default)]
    last_updated: String,
}

/// Durable store backed by a JSON file under the given data directory.
///
/// The in-memory copy is authoritative; disk writes are best-effort and
/// logged on failure, matching the infallible contract of the trait.
pub struct FileTokenStore {
    path: PathBuf,
    cached: parking_lot::RwLock<Credentials>,
}

impl FileTokenStore {
    /// Open (or create lazily) the token file under `data_dir`.
    ///
    /// An unreadable or invalid file is treated as empty.
    pub fn new(data_dir: &Path) -> Self {
        let path = data_dir.join(TOKEN_FILE_NAME);
        let cached = load_tokens(&path);
        Self {
            path,
            cached: parking_lot::RwLock::new(cached),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, credentials: &Credentials) {
        let stored = StoredTokens {
            credentials: credentials.clone(),
            last_updated: chrono::Utc::now().to_rfc3339(),
        };
        if let Err(e) = write_tokens(&self.path, &stored) {
            tracing::warn!(path = %self.path.display(), "failed to persist tokens: {e}");
        }
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Credentials {
        self.cached.read().clone()
    }

    fn set(&self, credentials: &Credentials) {
        *self.cached.write() = credentials.clone();
        self.persist(credentials);
    }

    fn clear(&self) {
        *self.cached.write() = Credentials::default();
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "failed to remove token file: {e}");
            }
        }
    }
}

fn load_tokens(path: &Path) -> Credentials {
    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Credentials::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), "failed to read token file: {e}");
            return Credentials::default();
        }
    };

    match serde_json::from_str::<StoredTokens>(&data) {
        Ok(stored) => stored.credentials,
        Err(e) => {
            tracing::warn!(path = %path.display(), "failed to parse token file: {e}");
            Credentials::default()
        }
    }
}

fn write_tokens(path: &Path, stored: &StoredTokens) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(stored)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(path, &json)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        let _ = std::fs::set_permissions(path, perms);
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ── Credentials ─────────────────────────────────────────────────

    #[test]
    fn default_credentials_are_empty() {
        assert!(Credentials::default().is_empty());
    }

    #[test]
    fn credentials_with_only_access_not_empty() {
        let creds = Credentials {
            access_token: Some("T1".into()),
            refresh_token: None,
        };
        assert!(!creds.is_empty());
    }

    // ── MemoryTokenStore ────────────────────────────────────────────

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryTokenStore::new();
        assert!(store.get().is_empty());

        store.set(&Credentials::new("T1", "R1"));
        let creds = store.get();
        assert_eq!(creds.access_token.as_deref(), Some("T1"));
        assert_eq!(creds.refresh_token.as_deref(), Some("R1"));
    }

    #[test]
    fn memory_store_clear_then_get_is_empty() {
        let store = MemoryTokenStore::new();
        store.set(&Credentials::new("T1", "R1"));
        store.clear();
        assert!(store.get().is_empty());
    }

    #[test]
    fn memory_store_clear_is_idempotent() {
        let store = MemoryTokenStore::new();
        store.clear();
        store.clear();
        assert!(store.get().is_empty());
    }

    // ── FileTokenStore ──────────────────────────────────────────────

    #[test]
    fn file_store_starts_empty_without_file() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path());
        assert!(store.get().is_empty());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = FileTokenStore::new(dir.path());
            store.set(&Credentials::new("T1", "R1"));
        }
        let reopened = FileTokenStore::new(dir.path());
        let creds = reopened.get();
        assert_eq!(creds.access_token.as_deref(), Some("T1"));
        assert_eq!(creds.refresh_token.as_deref(), Some("R1"));
    }

    #[test]
    fn file_store_clear_removes_file() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path());
        store.set(&Credentials::new("T1", "R1"));
        assert!(store.path().exists());

        store.clear();
        assert!(!store.path().exists());
        assert!(store.get().is_empty());

        let reopened = FileTokenStore::new(dir.path());
        assert!(reopened.get().is_empty());
    }

    #[test]
    fn file_store_tolerates_corrupt_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(TOKEN_FILE_NAME), "not json").unwrap();
        let store = FileTokenStore::new(dir.path());
        assert!(store.get().is_empty());
    }

    #[test]
    fn file_store_set_replaces_both_fields() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path());
        store.set(&Credentials::new("T1", "R1"));
        store.set(&Credentials {
            access_token: Some("T2".into()),
            refresh_token: None,
        });

        let creds = store.get();
        assert_eq!(creds.access_token.as_deref(), Some("T2"));
        assert!(creds.refresh_token.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn file_store_sets_permissions_0600() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path());
        store.set(&Credentials::new("T1", "R1"));
        let perms = std::fs::metadata(store.path()).unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o600);
    }

    #[test]
    fn stored_tokens_uses_fixed_key_names() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path());
        store.set(&Credentials::new("T1", "R1"));

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["access_token"], "T1");
        assert_eq!(value["refresh_token"], "R1");
        assert!(value["lastUpdated"].is_string());
    }
}
