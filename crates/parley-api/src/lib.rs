//! # parley-api
//!
//! Thin request/response plumbing for the Parley REST endpoints: fixed
//! URL templates, a bearer-header builder, and a response-status check.
//! Business payloads (tasks, messages, notifications) are opaque JSON
//! passed through unchanged.

#![deny(unsafe_code)]

pub mod client;
pub mod endpoints;
pub mod errors;

pub use client::ApiClient;
pub use errors::ApiError;
