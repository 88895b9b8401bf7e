//! # SharedModule
//!
//! Shared types and utilities used by the Worldsbase client crate and by
//! host-side bindings. This module contains request enums, constants, the
//! settings value and the error type, so every consumer agrees on them.

// Export module structure
pub mod types;
pub mod constants;
pub mod settings;
pub mod error;

// Re-export commonly used items for convenience
pub use types::{RequestVerb, RequestContentType, RequestStatus, HttpStatusCode};
pub use settings::Settings;
pub use error::{WorldsbaseError, WorldsbaseResult};
