//! # Errors
//!
//! Error type for the fallible boundaries of the client: file I/O, settings,
//! URL handling, transport setup, continuations and the scripting bridge.
//! Data-shape problems inside JSON documents never surface here; those are
//! logged and degrade to default values.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorldsbaseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request was cancelled before completion")]
    Cancelled,

    #[error("request failed with status {0}")]
    RequestFailed(i32),

    #[error("bridge call '{method}' failed: {reason}")]
    Bridge { method: String, reason: String },
}

impl WorldsbaseError {
    pub fn bridge(method: &str, reason: impl Into<String>) -> Self {
        Self::Bridge {
            method: method.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias used across the workspace
pub type WorldsbaseResult<T> = Result<T, WorldsbaseError>;
