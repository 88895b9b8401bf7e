//! # JSON Document Wrapper
//!
//! Typed access to JSON documents built on `serde_json`:
//!
//! - `JsonValue` wraps a single value and coerces it softly on read
//! - `JsonObject` wraps an object with typed field getters and setters
//! - `JsonStreamReader` frames a value from a character stream

pub mod value;
pub mod object;
pub mod reader;

pub use value::{JsonType, JsonValue};
pub use object::{FromJsonElement, JsonObject};
pub use reader::{JsonStreamReader, ReaderState};
