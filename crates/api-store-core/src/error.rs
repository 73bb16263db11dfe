//! Error kinds shared by every component, mapped to HTTP codes at the edge.

use thiserror::Error;

/// Every error kind in one enum so every layer can propagate `?`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    #[error("invalid cursor")]
    InvalidCursor,

    #[error("invalid token")]
    InvalidToken,

    #[error("not authorized")]
    NotAuthorized,

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error")]
    Internal(#[source] anyhow_like::BoxError),
}

/// A tiny stand-in for `anyhow::Error` so we don't pull in a second error
/// crate just to box arbitrary sources; `thiserror`'s `#[source]` is happy
/// with any `std::error::Error + Send + Sync`.
mod anyhow_like {
    pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
}

impl ApiError {
    /// Machine-readable discriminant used as the JSON `code` field.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "invalid_input",
            ApiError::InvalidPatch(_) => "invalid_patch",
            ApiError::InvalidCursor => "invalid_cursor",
            ApiError::InvalidToken => "invalid_token",
            ApiError::NotAuthorized => "not_authorized",
            ApiError::NotFound => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Internal(_) => "internal",
        }
    }

    /// HTTP status this error maps to at the edge.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::InvalidInput(_) | ApiError::InvalidPatch(_) | ApiError::InvalidCursor => {
                400
            }
            ApiError::InvalidToken => 401,
            ApiError::NotAuthorized => 403,
            ApiError::NotFound => 404,
            ApiError::Conflict(_) => 409,
            ApiError::Internal(_) => 500,
        }
    }

    /// The message surfaced to the client; `Internal` never leaks detail.
    pub fn client_message(&self) -> String {
        match self {
            ApiError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<sled::Error> for ApiError {
    fn from(e: sled::Error) -> Self {
        tracing::error!(error = %e, "sled error");
        ApiError::Internal(Box::new(e))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::InvalidInput(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
