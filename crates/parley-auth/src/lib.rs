//! # parley-auth
//!
//! Session token lifecycle for the Parley client.
//!
//! Two pieces:
//! - [`TokenStore`]: owns the access/refresh token pair and its
//!   persistence. [`FileTokenStore`] survives a restart;
//!   [`MemoryTokenStore`] is for tests and ephemeral sessions.
//! - [`SessionManager`]: login, signup, proactive/reactive refresh, and
//!   logout, publishing [`SessionState`] on a watch channel so the
//!   surrounding application reacts to degradation instead of catching
//!   errors.
//!
//! Refresh failures never surface to the caller; they silently degrade
//! the session to `Anonymous`.

#![deny(unsafe_code)]

pub mod errors;
pub mod session;
pub mod store;

pub use errors::AuthError;
pub use session::{SessionManager, SessionState};
pub use store::{Credentials, FileTokenStore, MemoryTokenStore, TokenStore};
