//! `GET /backend`: runtime-advertised capabilities and endpoint layout.
//! No auth required; never leaks secrets, only the shape of the server.

use crate::config::{AuthMode, ServerConfig};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct BackendInfo {
    pub mode: &'static str,
    pub prefix: String,
    pub websocket_paths: Vec<&'static str>,
}

impl BackendInfo {
    pub fn from_config(config: &ServerConfig) -> Self {
        BackendInfo {
            mode: match config.mode {
                AuthMode::SingleUser => "single-user",
                AuthMode::MultiUser => "multi-user",
            },
            prefix: config.prefix.clone(),
            websocket_paths: vec!["/files", "/files/:id", "/history", "/auth/login"],
        }
    }
}
