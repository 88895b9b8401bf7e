//! # Worldsbase Client Module
//!
//! Client-side functionality for talking to the Worldsbase game backend over
//! JSON REST calls. It handles JSON document access, the request/response
//! lifecycle and the table operations exposed by the backend.
//!
//! The system is organized into several sub-modules:
//! - `json`: Typed JSON documents and incremental decoding
//! - `request`: Request lifecycle, listeners and awaitable continuations
//! - `net`: Transport seam and the bundled transports
//! - `subsystem`: Table operations against the backend
//! - `library`: Small shared helpers
//! - `bridge`: Name-based entry points for script hosts

use std::rc::Rc;
use std::sync::Arc;

use log::info;

// Module declarations
pub mod json;        // JSON document wrapper
pub mod request;     // Request lifecycle
pub mod net;         // Transports
pub mod subsystem;   // Table facade
pub mod library;     // Utility helpers
pub mod bridge;      // Script host bridge

// Re-export commonly used items
pub use json::{JsonObject, JsonType, JsonValue};
pub use request::{RequestBody, RequestJson, ResponseFuture};
pub use net::{HttpRequest, HttpResponse, HttpTransport, ManualTransport, ReqwestTransport, TransportResult};
pub use subsystem::{DataRow, TableResponse, WorldsbaseSubsystem};
pub use bridge::ScriptBridge;
pub use worldsbase_shared::{
    HttpStatusCode, RequestContentType, RequestStatus, RequestVerb, Settings, WorldsbaseError,
    WorldsbaseResult,
};

/// Initialize the client module with its settings.
///
/// Returns the shared settings handle to pass to requests and subsystems.
pub fn init(settings: Settings) -> Arc<Settings> {
    info!("Worldsbase client ({}) module started", library::version());
    if settings.extended_log {
        info!("Extended request logging is enabled");
    }
    Arc::new(settings)
}

/// Create a request with verb and content type already set
pub fn construct_request_ext(
    settings: &Arc<Settings>,
    transport: &Rc<dyn HttpTransport>,
    verb: RequestVerb,
    content_type: RequestContentType,
) -> RequestJson {
    RequestJson::new_ext(settings.clone(), transport.clone(), verb, content_type)
}

/// Parse a JSON object, returning `None` when `text` is not one
pub fn parse_json_object(text: &str) -> Option<JsonObject> {
    let mut object = JsonObject::new();
    if object.decode_json(text) {
        Some(object)
    } else {
        None
    }
}
