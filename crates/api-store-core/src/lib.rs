//! Persistence and live-update engine backing the API client suite: an
//! ordered key-value store, a reversible JSON-Patch pipeline, session and
//! access control, and WebSocket fan-out.

pub mod access;
pub mod backend_info;
pub mod config;
pub mod cursor;
pub mod error;
pub mod events;
pub mod key_codec;
pub mod kv;
pub mod model;
pub mod patch;
pub mod session_store;
pub mod stores;
pub mod tokens;

pub use error::{ApiError, Result};
