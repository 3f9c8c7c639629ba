//! # parley-core
//!
//! Foundation for the Parley client: configuration with environment
//! overrides, canonical API/WebSocket URL resolution, and logging setup.
//!
//! Every other crate in the workspace resolves its endpoints through
//! [`urls`], so there is exactly one base-URL normalization rule in the
//! codebase.

#![deny(unsafe_code)]

pub mod logging;
pub mod settings;
pub mod urls;

pub use logging::init_logging;
pub use settings::ClientConfig;
pub use urls::{join_url, resolve_api_base, resolve_ws_url, urlencoded};
