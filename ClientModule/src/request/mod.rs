//! # Request Module
//!
//! `RequestJson` owns the lifecycle of one JSON REST call: it is configured
//! with a verb, an encoding, headers and a request body, dispatched through
//! an `HttpTransport`, and later filled with the parsed response when the
//! transport reports completion.
//!
//! A request is a cheap handle over shared single-threaded state. The
//! transport only keeps a weak reference, so dropping every handle turns a
//! late completion into a no-op. Each dispatch carries a generation number;
//! completions for a cancelled or superseded dispatch are ignored.
//!
//! On completion, listeners fire in this order: the request's own
//! listeners, then the process-wide listeners, then the continuation
//! returned by `apply_url`.

pub mod latent;
pub mod listeners;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde_json::Value;

use worldsbase_shared::constants::{content_type, header, DEPRECATED_RESPONSE_STRING};
use worldsbase_shared::{RequestContentType, RequestStatus, RequestVerb, Settings, WorldsbaseError};

use crate::json::value::coerce_string;
use crate::json::{JsonObject, JsonValue};
use crate::library::percent_encode;
use crate::net::{HttpRequest, HttpResponse, HttpTransport, TransportResult};

use latent::Continuation;
pub use latent::ResponseFuture;
pub use listeners::{add_static_complete_listener, add_static_fail_listener, remove_static_listener, ListenerId};

/// Listener attached to a single request
pub type RequestListenerFn = Box<dyn FnMut(&RequestJson) + 'static>;

/// Body supplied to `RequestJson::configure`
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Fields encoded according to the content type
    Object(JsonObject),
    /// Raw string body
    Text(String),
    /// Bytes for binary requests
    Bytes(Vec<u8>),
}

#[derive(Clone, Copy)]
enum ListenerKind {
    Complete,
    Fail,
}

#[derive(Default)]
struct RequestListeners {
    on_complete: Vec<RequestListenerFn>,
    on_fail: Vec<RequestListenerFn>,
}

impl RequestListeners {
    fn slot(&mut self, kind: ListenerKind) -> &mut Vec<RequestListenerFn> {
        match kind {
            ListenerKind::Complete => &mut self.on_complete,
            ListenerKind::Fail => &mut self.on_fail,
        }
    }
}

struct RequestState {
    settings: Arc<Settings>,

    // Request
    verb: RequestVerb,
    custom_verb: String,
    content_type: RequestContentType,
    binary_content_type: String,
    request_bytes: Vec<u8>,
    string_request_content: String,
    request_headers: Vec<(String, String)>,
    request_object: JsonObject,
    url: String,
    tags: Vec<String>,
    status: RequestStatus,

    // Response
    response_object: JsonObject,
    response_value: JsonValue,
    response_headers: HashMap<String, String>,
    response_code: i32,
    response_size: usize,
    response_content: String,
    response_raw_content: String,
    valid_json: bool,
    response_bytes: Vec<u8>,
    response_content_length: usize,

    // Dispatch
    dispatch_counter: u64,
    in_flight: Option<u64>,
    continuation: Option<Continuation>,
}

impl RequestState {
    fn new(settings: Arc<Settings>) -> Self {
        let mut state = Self {
            settings,
            verb: RequestVerb::Get,
            custom_verb: String::new(),
            content_type: RequestContentType::UrlEncodedUrl,
            binary_content_type: content_type::OCTET_STREAM.to_string(),
            request_bytes: Vec::new(),
            string_request_content: String::new(),
            request_headers: Vec::new(),
            request_object: JsonObject::new(),
            url: String::new(),
            tags: Vec::new(),
            status: RequestStatus::NotStarted,
            response_object: JsonObject::new(),
            response_value: JsonValue::new(),
            response_headers: HashMap::new(),
            response_code: -1,
            response_size: 0,
            response_content: String::new(),
            response_raw_content: String::new(),
            valid_json: false,
            response_bytes: Vec::new(),
            response_content_length: 0,
            dispatch_counter: 0,
            in_flight: None,
            continuation: None,
        };
        state.reset_response_data();
        state
    }

    fn reset_request_data(&mut self) {
        self.request_object.reset();
        self.request_bytes.clear();
        self.string_request_content.clear();
    }

    fn reset_response_data(&mut self) {
        self.response_object.reset();
        self.response_value.reset();
        self.response_headers.clear();
        self.response_code = -1;
        self.response_size = 0;
        self.valid_json = false;
        self.response_content = DEPRECATED_RESPONSE_STRING.to_string();
        self.response_raw_content.clear();
        self.response_bytes.clear();
        self.response_content_length = 0;
    }

    fn set_request_header(&mut self, name: &str, value: &str) {
        match self
            .request_headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.request_headers.push((name.to_string(), value.to_string())),
        }
    }

    fn verb_name(&self) -> String {
        match self.verb.as_str() {
            Some(name) => name.to_string(),
            None => self.custom_verb.clone(),
        }
    }

    /// Build the wire request from the current configuration
    fn build_wire_request(&self) -> HttpRequest {
        let verb = self.verb_name();
        let mut wire = HttpRequest::new(&verb, &self.url);
        let extended_log = self.settings.extended_log;

        match self.content_type {
            RequestContentType::UrlEncodedUrl => {
                wire.set_header(header::CONTENT_TYPE, content_type::FORM_URLENCODED);

                let params = url_encode_fields(&self.request_object);
                if !params.is_empty() {
                    let separator = if wire.url.contains('?') { '&' } else { '?' };
                    wire.url = format!("{}{}{}", wire.url, separator, params);
                }
                if !self.string_request_content.is_empty() {
                    wire.body = self.string_request_content.as_bytes().to_vec();
                }

                if extended_log {
                    info!("Request (urlencoded): {} {} {} {}", verb, wire.url, params, self.string_request_content);
                } else {
                    info!("Request (urlencoded): {} {} (enable extended_log for additional data)", verb, self.url);
                }
            }
            RequestContentType::UrlEncodedBody => {
                wire.set_header(header::CONTENT_TYPE, content_type::FORM_URLENCODED);

                let body = if self.string_request_content.is_empty() {
                    url_encode_fields(&self.request_object)
                } else {
                    self.string_request_content.clone()
                };

                if extended_log {
                    info!("Request (url body): {} {} {}", verb, wire.url, body);
                } else {
                    info!("Request (url body): {} {} (enable extended_log for additional data)", verb, wire.url);
                }
                wire.body = body.into_bytes();
            }
            RequestContentType::Binary => {
                wire.set_header(header::CONTENT_TYPE, &self.binary_content_type);
                wire.body = self.request_bytes.clone();

                info!("Request (binary): {} {}", verb, wire.url);
            }
            RequestContentType::Json => {
                wire.set_header(header::CONTENT_TYPE, content_type::JSON);

                // GET bodies are ignored by servers, so none is sent even for an empty object
                if self.verb != RequestVerb::Get {
                    let body = self.request_object.encode_json_to_single_string();
                    if extended_log {
                        info!("Request (json): {} {} JSON({})JSON", verb, wire.url, body);
                    } else {
                        info!("Request (json): {} {} (enable extended_log for additional data)", verb, wire.url);
                    }
                    wire.body = body.into_bytes();
                } else {
                    info!("Request (json): {} {}", verb, wire.url);
                }
            }
        }

        for (name, value) in &self.request_headers {
            wire.set_header(name, value);
        }

        wire
    }

    /// Fill response state from a completed exchange
    fn apply_response(&mut self, response: &HttpResponse) {
        self.status = RequestStatus::Succeeded;

        if self.settings.extended_log {
            debug!(
                "Response ({}): JSON({})JSON",
                self.response_code,
                String::from_utf8_lossy(&response.body)
            );
        } else {
            debug!("Response ({}): {} bytes", self.response_code, response.body.len());
        }

        self.response_raw_content = String::from_utf8_lossy(&response.body).into_owned();

        for line in &response.headers {
            if let Some((key, value)) = line.split_once(": ") {
                self.response_headers.insert(key.to_string(), value.to_string());
            }
        }

        if self.settings.use_chunked_parser {
            self.response_size = self.response_object.decode_from_utf8_bytes(&response.body);
            if self.response_size == 0 {
                warn!("JSON could not be decoded!");
            } else {
                self.response_value = JsonValue::from_object(self.response_object.clone());
            }
        } else {
            let content = String::from_utf8_lossy(&response.body);
            match serde_json::from_str::<Value>(strip_array_wrapper(&content)) {
                Ok(value) => {
                    // Only objects are promoted to the response object
                    if let Value::Object(root) = &value {
                        self.response_object.set_root_object(root.clone());
                        self.response_size = response.content_length;
                    }
                    self.response_value.set_root_value(value);
                }
                Err(e) => debug!("Response body is not JSON: {}", e),
            }
        }

        self.valid_json = self.response_size > 0;

        if !self.valid_json {
            self.response_content = String::from_utf8_lossy(&response.body).into_owned();
            self.response_size = self.response_content.len();
            self.response_bytes = response.body.clone();
            self.response_content_length = response.content_length;
        }
    }
}

/// Percent-encoded `key=value` pairs joined with `&`. Fields with an empty
/// key or an empty string reading are skipped.
fn url_encode_fields(object: &JsonObject) -> String {
    object
        .get_root_object()
        .iter()
        .filter_map(|(key, value)| {
            let value = coerce_string(value).unwrap_or_default();
            if key.is_empty() || value.is_empty() {
                None
            } else {
                Some(format!("{}={}", percent_encode(key), percent_encode(&value)))
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Remove one wrapping `[` `]` pair around the body, so a single-object
/// array decodes as that object
fn strip_array_wrapper(content: &str) -> &str {
    let trimmed = content.trim();
    match trimmed.strip_prefix('[').and_then(|inner| inner.strip_suffix(']')) {
        Some(inner) => inner,
        None => content,
    }
}

struct RequestInner {
    state: RefCell<RequestState>,
    listeners: RefCell<RequestListeners>,
    transport: Rc<dyn HttpTransport>,
}

/// Handle to one JSON REST call
#[derive(Clone)]
pub struct RequestJson {
    inner: Rc<RequestInner>,
}

impl fmt::Debug for RequestJson {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.state.try_borrow() {
            Ok(state) => f
                .debug_struct("RequestJson")
                .field("verb", &state.verb_name())
                .field("url", &state.url)
                .field("status", &state.status)
                .field("response_code", &state.response_code)
                .finish(),
            Err(_) => f.write_str("RequestJson { <busy> }"),
        }
    }
}

impl RequestJson {
    pub fn new(settings: Arc<Settings>, transport: Rc<dyn HttpTransport>) -> Self {
        Self {
            inner: Rc::new(RequestInner {
                state: RefCell::new(RequestState::new(settings)),
                listeners: RefCell::new(RequestListeners::default()),
                transport,
            }),
        }
    }

    /// Create a request with verb and content type already set
    pub fn new_ext(
        settings: Arc<Settings>,
        transport: Rc<dyn HttpTransport>,
        verb: RequestVerb,
        content_type: RequestContentType,
    ) -> Self {
        let request = Self::new(settings, transport);
        request.set_verb(verb);
        request.set_content_type(content_type);
        request
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.inner.state.borrow().settings.clone()
    }

    /// Whether two handles refer to the same request
    pub fn ptr_eq(&self, other: &RequestJson) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    //////////////////////////////////////////////////////////////////////////
    // Configuration

    /// Set verb, encoding, headers and body in one call
    pub fn configure<I, K, V>(&self, verb: RequestVerb, content_type: RequestContentType, headers: I, body: RequestBody)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut state = self.inner.state.borrow_mut();
        state.verb = verb;
        state.content_type = content_type;
        for (name, value) in headers {
            state.set_request_header(name.as_ref(), value.as_ref());
        }
        match body {
            RequestBody::Object(object) => state.request_object = object,
            RequestBody::Text(text) => state.string_request_content = text,
            RequestBody::Bytes(bytes) => state.request_bytes = bytes,
        }
    }

    pub fn set_verb(&self, verb: RequestVerb) {
        self.inner.state.borrow_mut().verb = verb;
    }

    pub fn get_verb(&self) -> RequestVerb {
        self.inner.state.borrow().verb
    }

    /// Verb string used when the verb is `RequestVerb::Custom`
    pub fn set_custom_verb(&self, verb: &str) {
        self.inner.state.borrow_mut().custom_verb = verb.to_string();
    }

    pub fn set_content_type(&self, content_type: RequestContentType) {
        self.inner.state.borrow_mut().content_type = content_type;
    }

    pub fn get_content_type(&self) -> RequestContentType {
        self.inner.state.borrow().content_type
    }

    /// `Content-Type` sent with binary requests
    pub fn set_binary_content_type(&self, content_type: &str) {
        self.inner.state.borrow_mut().binary_content_type = content_type.to_string();
    }

    pub fn set_binary_request_content(&self, bytes: &[u8]) {
        self.inner.state.borrow_mut().request_bytes = bytes.to_vec();
    }

    /// Raw string body. For URL-encoded bodies it replaces the encoded
    /// request fields.
    pub fn set_string_request_content(&self, content: &str) {
        self.inner.state.borrow_mut().string_request_content = content.to_string();
    }

    /// Add a header. A later value for the same name replaces the earlier one.
    pub fn set_header(&self, name: &str, value: &str) {
        self.inner.state.borrow_mut().set_request_header(name, value);
    }

    pub fn set_api_key(&self, api_key: &str) {
        self.set_header(header::API_KEY, api_key);
    }

    pub fn set_authorization_token(&self, token: &str) {
        self.set_header(header::AUTHORIZATION, &format!("Bearer {}", token));
    }

    pub fn get_request_object(&self) -> JsonObject {
        self.inner.state.borrow().request_object.clone()
    }

    pub fn set_request_object(&self, object: JsonObject) {
        self.inner.state.borrow_mut().request_object = object;
    }

    /// Edit the request object in place
    pub fn with_request_object<R>(&self, edit: impl FnOnce(&mut JsonObject) -> R) -> R {
        edit(&mut self.inner.state.borrow_mut().request_object)
    }

    //////////////////////////////////////////////////////////////////////////
    // Reset

    pub fn reset_data(&self) {
        let mut state = self.inner.state.borrow_mut();
        state.reset_request_data();
        state.reset_response_data();
    }

    /// Clear the request object and both raw bodies. Verb, encoding and
    /// headers are kept.
    pub fn reset_request_data(&self) {
        self.inner.state.borrow_mut().reset_request_data();
    }

    pub fn reset_response_data(&self) {
        self.inner.state.borrow_mut().reset_response_data();
    }

    /// Drop the pending continuation and forget the in-flight dispatch.
    /// A later completion for that dispatch is ignored.
    pub fn cancel(&self) {
        let (continuation, in_flight) = {
            let mut state = self.inner.state.borrow_mut();
            let continuation = state.continuation.take();
            let in_flight = state.in_flight.take();
            state.reset_response_data();
            state.status = RequestStatus::NotStarted;
            (continuation, in_flight)
        };

        if let Some(dispatch) = in_flight {
            debug!("Cancelled dispatch {}", dispatch);
        }
        // Dropping the sender wakes the waiting future with `Cancelled`
        drop(continuation);
    }

    //////////////////////////////////////////////////////////////////////////
    // URL and dispatch

    pub fn set_url(&self, url: &str) {
        self.inner.state.borrow_mut().url = url.trim().to_string();
    }

    pub fn get_url(&self) -> String {
        self.inner.state.borrow().url.clone()
    }

    /// Set the URL and dispatch. Returns false when the URL is empty.
    pub fn process_url(&self, url: &str) -> bool {
        self.set_url(url);
        self.execute_process_request()
    }

    /// Dispatch with the configured URL. Refuses an empty URL.
    pub fn execute_process_request(&self) -> bool {
        if self.inner.state.borrow().url.is_empty() {
            error!("Request execution attempt with empty URL");
            return false;
        }
        self.process_request();
        true
    }

    /// Build the wire request and hand it to the transport. Returns the
    /// dispatch id.
    pub fn process_request(&self) -> u64 {
        self.dispatch(false).0
    }

    /// Dispatch to `url` and return a future resolved with the response
    /// object. A continuation still pending from an earlier call is
    /// cancelled first.
    pub fn apply_url(&self, url: &str) -> ResponseFuture {
        self.set_url(url);

        let replaced = self.inner.state.borrow_mut().continuation.take();
        if let Some(previous) = replaced {
            debug!("Replacing pending continuation {}", previous.id());
            drop(previous);
            self.cancel();
        }

        let (_, future) = self.dispatch(true);
        match future {
            Some(future) => future,
            // dispatch(true) always registers a continuation
            None => Continuation::new(0).1,
        }
    }

    /// Whether a dispatch is waiting for its completion
    pub fn is_in_flight(&self) -> bool {
        self.inner.state.borrow().in_flight.is_some()
    }

    fn dispatch(&self, with_continuation: bool) -> (u64, Option<ResponseFuture>) {
        let (generation, wire, future) = {
            let mut state = self.inner.state.borrow_mut();
            state.dispatch_counter += 1;
            let generation = state.dispatch_counter;
            if let Some(previous) = state.in_flight.replace(generation) {
                debug!("Dispatch {} supersedes dispatch {}", generation, previous);
            }
            state.status = RequestStatus::Processing;

            let future = if with_continuation {
                let (continuation, future) = Continuation::new(generation);
                state.continuation = Some(continuation);
                Some(future)
            } else {
                None
            };

            (generation, state.build_wire_request(), future)
        };

        let weak = Rc::downgrade(&self.inner);
        self.inner.transport.process(
            wire,
            Box::new(move |result| match weak.upgrade() {
                Some(inner) => RequestJson { inner }.on_process_request_complete(generation, result),
                None => debug!("Request dropped before dispatch {} completed", generation),
            }),
        );

        (generation, future)
    }

    fn on_process_request_complete(&self, generation: u64, result: TransportResult) {
        let (succeeded, code, continuation) = {
            let mut state = self.inner.state.borrow_mut();
            if state.in_flight != Some(generation) {
                debug!("Ignoring completion of cancelled or superseded dispatch {}", generation);
                return;
            }
            state.in_flight = None;

            // No data from an earlier response survives
            state.reset_response_data();
            if let Some(response) = &result.response {
                state.response_code = response.status;
            }

            let succeeded = match (result.success, &result.response) {
                (true, Some(response)) => {
                    state.apply_response(response);
                    true
                }
                (_, response) => {
                    error!("Request failed ({}): {}", state.response_code, state.url);
                    state.status = if response.is_some() {
                        RequestStatus::Failed
                    } else {
                        RequestStatus::FailedConnectionError
                    };
                    false
                }
            };

            (succeeded, state.response_code, state.continuation.take())
        };

        if succeeded {
            self.notify(ListenerKind::Complete);
            listeners::broadcast_complete(self);
            if let Some(continuation) = continuation {
                continuation.resolve(Ok(self.get_response_object()));
            }
        } else {
            self.notify(ListenerKind::Fail);
            listeners::broadcast_fail(self);
            if let Some(continuation) = continuation {
                continuation.resolve(Err(WorldsbaseError::RequestFailed(code)));
            }
        }
    }

    //////////////////////////////////////////////////////////////////////////
    // Listeners

    /// Run `listener` after every successful completion of this request
    pub fn add_on_request_complete(&self, listener: impl FnMut(&RequestJson) + 'static) {
        self.inner.listeners.borrow_mut().on_complete.push(Box::new(listener));
    }

    /// Run `listener` after every failed dispatch of this request
    pub fn add_on_request_fail(&self, listener: impl FnMut(&RequestJson) + 'static) {
        self.inner.listeners.borrow_mut().on_fail.push(Box::new(listener));
    }

    pub fn clear_listeners(&self) {
        *self.inner.listeners.borrow_mut() = RequestListeners::default();
    }

    fn notify(&self, kind: ListenerKind) {
        // Listeners are moved out while they run so they can use this handle freely
        let mut running = std::mem::take(self.inner.listeners.borrow_mut().slot(kind));
        for listener in running.iter_mut() {
            listener(self);
        }

        let mut listeners = self.inner.listeners.borrow_mut();
        let slot = listeners.slot(kind);
        running.append(slot);
        *slot = running;
    }

    //////////////////////////////////////////////////////////////////////////
    // Response

    pub fn get_status(&self) -> RequestStatus {
        self.inner.state.borrow().status
    }

    /// HTTP status of the last response, -1 when none was received
    pub fn get_response_code(&self) -> i32 {
        self.inner.state.borrow().response_code
    }

    pub fn get_response_object(&self) -> JsonObject {
        self.inner.state.borrow().response_object.clone()
    }

    pub fn set_response_object(&self, object: JsonObject) {
        self.inner.state.borrow_mut().response_object = object;
    }

    /// Read the response object without copying it
    pub fn with_response_object<R>(&self, read: impl FnOnce(&JsonObject) -> R) -> R {
        read(&self.inner.state.borrow().response_object)
    }

    /// The parsed response body whatever its type, when it parsed at all
    pub fn get_response_value(&self) -> JsonValue {
        self.inner.state.borrow().response_value.clone()
    }

    pub fn is_valid_json_response(&self) -> bool {
        self.inner.state.borrow().valid_json
    }

    /// Content length for valid JSON, otherwise the length of the raw
    /// content string
    pub fn response_size(&self) -> usize {
        self.inner.state.borrow().response_size
    }

    /// Value of a response header, or an empty string when absent
    pub fn get_response_header(&self, name: &str) -> String {
        let state = self.inner.state.borrow();
        match state.response_headers.get(name) {
            Some(value) => value.clone(),
            None => {
                warn!("Response header {} not found", name);
                String::new()
            }
        }
    }

    /// Response headers formatted as `"Key: Value"`
    pub fn get_all_response_headers(&self) -> Vec<String> {
        self.inner
            .state
            .borrow()
            .response_headers
            .iter()
            .map(|(key, value)| format!("{}: {}", key, value))
            .collect()
    }

    /// Raw response bytes. Only kept when the response was not valid JSON.
    pub fn get_response_content(&self) -> Vec<u8> {
        self.inner.state.borrow().response_bytes.clone()
    }

    /// Body text exactly as the server sent it, for any successful response
    pub fn get_response_raw_content(&self) -> String {
        self.inner.state.borrow().response_raw_content.clone()
    }

    pub fn get_response_content_length(&self) -> usize {
        self.inner.state.borrow().response_content_length
    }

    /// Response as text.
    ///
    /// For a non-JSON response this is the raw content. For a JSON response
    /// it is the encoded response object, computed once and reused when
    /// `cache` is set.
    pub fn get_response_content_as_string(&self, cache: bool) -> String {
        let mut state = self.inner.state.borrow_mut();
        if !state.valid_json {
            return state.response_content.clone();
        }

        if !cache {
            warn!("Use of uncached getter could be slow");
            return state.response_object.encode_json();
        }

        if state.response_content == DEPRECATED_RESPONSE_STRING {
            debug!("Caching response content string");
            state.response_content = state.response_object.encode_json();
        }
        state.response_content.clone()
    }

    //////////////////////////////////////////////////////////////////////////
    // Tags

    /// Add a tag once. Empty tags are ignored.
    pub fn add_tag(&self, tag: &str) {
        if tag.is_empty() {
            return;
        }
        let mut state = self.inner.state.borrow_mut();
        if !state.tags.iter().any(|existing| existing == tag) {
            state.tags.push(tag.to_string());
        }
    }

    /// Remove a tag, returning how many entries were removed
    pub fn remove_tag(&self, tag: &str) -> usize {
        let mut state = self.inner.state.borrow_mut();
        let before = state.tags.len();
        state.tags.retain(|existing| existing != tag);
        before - state.tags.len()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        !tag.is_empty() && self.inner.state.borrow().tags.iter().any(|existing| existing == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ManualTransport;
    use std::cell::Cell;

    fn setup(settings: Settings) -> (RequestJson, Rc<ManualTransport>) {
        let transport = Rc::new(ManualTransport::new());
        let request = RequestJson::new(Arc::new(settings), transport.clone());
        (request, transport)
    }

    fn last_wire(transport: &ManualTransport) -> HttpRequest {
        transport.last_request().unwrap().1
    }

    #[test]
    fn test_defaults() {
        let (request, _) = setup(Settings::default());
        assert_eq!(request.get_verb(), RequestVerb::Get);
        assert_eq!(request.get_content_type(), RequestContentType::UrlEncodedUrl);
        assert_eq!(request.get_status(), RequestStatus::NotStarted);
        assert_eq!(request.get_response_code(), -1);
        assert_eq!(request.get_response_content_as_string(true), DEPRECATED_RESPONSE_STRING);
        assert!(!request.is_valid_json_response());
    }

    #[test]
    fn test_url_encoded_query() {
        let (request, transport) = setup(Settings::default());
        request.with_request_object(|object| {
            object.set_string_field("name", "a b");
            object.set_string_field("empty", "");
            object.set_integer_field("n", 5);
            object.set_object_field("skipped", &JsonObject::new());
        });
        assert!(request.process_url("  http://localhost/search  "));

        let wire = last_wire(&transport);
        assert_eq!(wire.verb, "GET");
        assert_eq!(wire.url, "http://localhost/search?name=a%20b&n=5");
        assert_eq!(wire.header("Content-Type"), Some(content_type::FORM_URLENCODED));
        assert!(wire.body.is_empty());
        assert_eq!(request.get_url(), "http://localhost/search");
    }

    #[test]
    fn test_url_encoded_query_appends_to_existing_query() {
        let (request, transport) = setup(Settings::default());
        request.with_request_object(|object| object.set_string_field("b", "2"));
        request.process_url("http://localhost/q?a=1");
        assert_eq!(last_wire(&transport).url, "http://localhost/q?a=1&b=2");
    }

    #[test]
    fn test_url_encoded_body_and_string_override() {
        let (request, transport) = setup(Settings::default());
        request.set_verb(RequestVerb::Post);
        request.set_content_type(RequestContentType::UrlEncodedBody);
        request.with_request_object(|object| {
            object.set_string_field("user", "x&y");
            object.set_bool_field("admin", false);
        });
        request.process_url("http://localhost/form");
        assert_eq!(last_wire(&transport).body_as_string(), "user=x%26y&admin=false");

        request.set_string_request_content("raw=1");
        request.process_url("http://localhost/form");
        assert_eq!(last_wire(&transport).body_as_string(), "raw=1");
    }

    #[test]
    fn test_json_body_skipped_for_get() {
        let (request, transport) = setup(Settings::default());
        request.set_content_type(RequestContentType::Json);
        request.with_request_object(|object| object.set_integer_field("a", 1));
        request.process_url("http://localhost/json");
        let wire = last_wire(&transport);
        assert!(wire.body.is_empty());
        assert_eq!(wire.header("Content-Type"), Some(content_type::JSON));

        request.set_verb(RequestVerb::Put);
        request.process_url("http://localhost/json");
        let wire = last_wire(&transport);
        assert_eq!(wire.verb, "PUT");
        assert_eq!(wire.body_as_string(), r#"{"a":1}"#);
    }

    #[test]
    fn test_binary_and_custom_verb() {
        let (request, transport) = setup(Settings::default());
        request.set_verb(RequestVerb::Custom);
        request.set_custom_verb("PATCH");
        request.set_content_type(RequestContentType::Binary);
        request.set_binary_request_content(&[1, 2, 3]);
        request.process_url("http://localhost/blob");

        let wire = last_wire(&transport);
        assert_eq!(wire.verb, "PATCH");
        assert_eq!(wire.body, vec![1, 2, 3]);
        assert_eq!(wire.header("content-type"), Some(content_type::OCTET_STREAM));

        request.set_binary_content_type("image/png");
        request.process_url("http://localhost/blob");
        assert_eq!(last_wire(&transport).header("Content-Type"), Some("image/png"));
    }

    #[test]
    fn test_headers_last_write_wins_and_override_content_type() {
        let (request, transport) = setup(Settings::default());
        request.set_header("X-Trace", "1");
        request.set_header("X-Trace", "2");
        request.set_api_key("K");
        request.set_authorization_token("T");
        request.set_header("content-type", "text/plain");
        request.process_url("http://localhost/");

        let wire = last_wire(&transport);
        assert_eq!(wire.header("X-Trace"), Some("2"));
        assert_eq!(wire.header("x-api-key"), Some("K"));
        assert_eq!(wire.header("Authorization"), Some("Bearer T"));
        assert_eq!(wire.header("Content-Type"), Some("text/plain"));
    }

    #[test]
    fn test_configure() {
        let (request, transport) = setup(Settings::default());
        let mut body = JsonObject::new();
        body.set_string_field("k", "v");
        request.configure(
            RequestVerb::Post,
            RequestContentType::Json,
            [("x-api-key", "K")],
            RequestBody::Object(body),
        );
        request.process_url("http://localhost/c");

        let wire = last_wire(&transport);
        assert_eq!(wire.verb, "POST");
        assert_eq!(wire.body_as_string(), r#"{"k":"v"}"#);
        assert_eq!(wire.header("x-api-key"), Some("K"));
    }

    #[test]
    fn test_empty_url_is_refused() {
        let (request, transport) = setup(Settings::default());
        assert!(!request.execute_process_request());
        assert!(!request.process_url("   "));
        assert_eq!(transport.pending_count(), 0);
    }

    #[test]
    fn test_json_response_and_headers() {
        let (request, transport) = setup(Settings::default());
        request.process_url("http://localhost/");
        assert_eq!(request.get_status(), RequestStatus::Processing);
        assert!(request.is_in_flight());

        transport.complete_next(
            HttpResponse::new(200, r#"{"rows":[1,2,3]}"#)
                .with_header("Content-Type", "application/json")
                .with_header("X-Odd", "a: b"),
        );

        assert_eq!(request.get_status(), RequestStatus::Succeeded);
        assert!(request.is_valid_json_response());
        assert_eq!(request.response_size(), 16);
        assert_eq!(request.get_response_header("X-Odd"), "a: b");
        assert_eq!(request.get_response_header("Missing"), "");
        assert!(request
            .get_all_response_headers()
            .contains(&"Content-Type: application/json".to_string()));
        assert!(request.get_response_content().is_empty());
        assert_eq!(request.get_response_raw_content(), r#"{"rows":[1,2,3]}"#);
        assert_eq!(
            request.with_response_object(|object| object.get_integer_array_field("rows")),
            vec![1, 2, 3]
        );

        request.reset_response_data();
        assert_eq!(request.get_response_raw_content(), "");
    }

    #[test]
    fn test_single_object_array_is_unwrapped() {
        let (request, transport) = setup(Settings::default());
        request.process_url("http://localhost/");
        transport.complete_next(HttpResponse::new(200, r#"[{"id": 4}]"#));
        assert!(request.is_valid_json_response());
        assert_eq!(request.get_response_object().get_integer_field("id"), 4);
    }

    #[test]
    fn test_bare_array_is_not_valid_json() {
        let (request, transport) = setup(Settings::default());
        request.process_url("http://localhost/");
        transport.complete_next(HttpResponse::new(200, "[1,2,3]"));

        assert!(!request.is_valid_json_response());
        assert!(request.get_response_object().get_field_names().is_empty());
        assert_eq!(request.get_response_content_as_string(true), "[1,2,3]");
        assert_eq!(request.get_response_content(), b"[1,2,3]".to_vec());
        assert_eq!(request.get_response_content_length(), 7);
        assert_eq!(request.response_size(), 7);
    }

    #[test]
    fn test_scalar_response_is_exposed_as_value() {
        let (request, transport) = setup(Settings::default());
        request.process_url("http://localhost/");
        transport.complete_next(HttpResponse::new(200, "42"));

        assert!(!request.is_valid_json_response());
        assert_eq!(request.get_response_value().as_int32(), 42);
        assert_eq!(request.get_response_content_as_string(false), "42");
    }

    #[test]
    fn test_response_string_cache() {
        let (request, transport) = setup(Settings::default());
        request.process_url("http://localhost/");
        transport.complete_next(HttpResponse::new(200, r#"{"a":1}"#));

        let uncached = request.get_response_content_as_string(false);
        let cached = request.get_response_content_as_string(true);
        assert_eq!(uncached, cached);
        assert_eq!(cached, request.get_response_object().encode_json());
        assert_eq!(request.get_response_content_as_string(true), cached);
    }

    #[test]
    fn test_chunked_parser_path() {
        let settings = Settings {
            use_chunked_parser: true,
            ..Settings::default()
        };
        let (request, transport) = setup(settings);
        request.process_url("http://localhost/");
        transport.complete_next(HttpResponse::new(200, "{\"a\": true}\r\n"));

        assert!(request.is_valid_json_response());
        assert_eq!(request.response_size(), 11);
        assert!(request.get_response_object().get_bool_field("a"));

        request.process_url("http://localhost/");
        transport.complete_next(HttpResponse::new(200, "oops"));
        assert!(!request.is_valid_json_response());
        assert_eq!(request.get_response_content_as_string(true), "oops");
    }

    #[test]
    fn test_failure_clears_previous_response() {
        let (request, transport) = setup(Settings::default());
        let failures = Rc::new(Cell::new(0));
        let completions = Rc::new(Cell::new(0));
        let (f, c) = (failures.clone(), completions.clone());
        request.add_on_request_fail(move |_| f.set(f.get() + 1));
        request.add_on_request_complete(move |_| c.set(c.get() + 1));

        request.process_url("http://localhost/");
        transport.complete_next(HttpResponse::new(200, r#"{"stale": 1}"#));
        assert!(request.is_valid_json_response());

        request.process_url("http://localhost/");
        let (ticket, _) = transport.last_request().unwrap();
        transport.fail(ticket, Some(HttpResponse::new(503, "down")));

        assert_eq!(request.get_status(), RequestStatus::Failed);
        assert_eq!(request.get_response_code(), 503);
        assert!(!request.is_valid_json_response());
        assert!(request.get_response_object().get_field_names().is_empty());
        assert_eq!(request.get_response_value().get_type(), crate::json::JsonType::None);
        assert_eq!((completions.get(), failures.get()), (1, 1));

        request.process_url("http://localhost/");
        let (ticket, _) = transport.last_request().unwrap();
        transport.fail(ticket, None);
        assert_eq!(request.get_status(), RequestStatus::FailedConnectionError);
        assert_eq!(request.get_response_code(), -1);
    }

    #[test]
    fn test_cancel_ignores_late_completion() {
        let (request, transport) = setup(Settings::default());
        let completions = Rc::new(Cell::new(0));
        let c = completions.clone();
        request.add_on_request_complete(move |_| c.set(c.get() + 1));

        let mut future = request.apply_url("http://localhost/");
        request.cancel();
        assert!(!request.is_in_flight());

        transport.complete_next(HttpResponse::new(200, r#"{"a":1}"#));
        assert_eq!(completions.get(), 0);
        assert!(!request.is_valid_json_response());
        assert!(matches!(future.try_take(), Some(Err(WorldsbaseError::Cancelled))));
    }

    #[test]
    fn test_apply_url_resolves_after_listeners() {
        let (request, transport) = setup(Settings::default());
        let order = Rc::new(RefCell::new(Vec::new()));
        let log = order.clone();
        request.add_on_request_complete(move |_| log.borrow_mut().push("listener"));

        let mut future = request.apply_url("http://localhost/");
        assert!(future.try_take().is_none());

        transport.complete_next(HttpResponse::new(200, r#"{"v": "x"}"#));
        order.borrow_mut().push("resolved");
        let object = future.try_take().unwrap().unwrap();
        assert_eq!(object.get_string_field("v"), "x");
        assert_eq!(*order.borrow(), vec!["listener", "resolved"]);
    }

    #[test]
    fn test_apply_url_failure_resolves_with_error() {
        let (request, transport) = setup(Settings::default());
        let mut future = request.apply_url("http://localhost/");
        let (ticket, _) = transport.last_request().unwrap();
        transport.fail(ticket, Some(HttpResponse::new(500, "")));
        assert!(matches!(future.try_take(), Some(Err(WorldsbaseError::RequestFailed(500)))));
    }

    #[test]
    fn test_replacing_continuation_cancels_first() {
        let (request, transport) = setup(Settings::default());
        let mut first = request.apply_url("http://localhost/one");
        let mut second = request.apply_url("http://localhost/two");
        assert_ne!(first.id(), second.id());
        assert!(matches!(first.try_take(), Some(Err(WorldsbaseError::Cancelled))));

        let pending = transport.pending();
        assert_eq!(pending.len(), 2);
        // The superseded dispatch completing first changes nothing
        transport.complete(pending[0].0, HttpResponse::new(200, r#"{"which": 1}"#));
        assert!(second.try_take().is_none());

        transport.complete(pending[1].0, HttpResponse::new(200, r#"{"which": 2}"#));
        assert_eq!(second.try_take().unwrap().unwrap().get_integer_field("which"), 2);
    }

    #[test]
    fn test_dropped_request_ignores_completion() {
        let (request, transport) = setup(Settings::default());
        request.process_url("http://localhost/");
        drop(request);
        assert!(transport.complete_next(HttpResponse::new(200, "{}")));
    }

    #[test]
    fn test_listener_may_redispatch() {
        let (request, transport) = setup(Settings::default());
        let runs = Rc::new(Cell::new(0));
        let r = runs.clone();
        request.add_on_request_complete(move |request| {
            r.set(r.get() + 1);
            if r.get() == 1 {
                request.process_url("http://localhost/again");
            }
        });

        request.process_url("http://localhost/");
        transport.complete_next(HttpResponse::new(200, "{}"));
        assert!(request.is_in_flight());
        assert_eq!(last_wire(&transport).url, "http://localhost/again");

        transport.complete_next(HttpResponse::new(200, "{}"));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn test_reset_response_is_idempotent() {
        let (request, transport) = setup(Settings::default());
        request.process_url("http://localhost/");
        transport.complete_next(HttpResponse::new(201, r#"{"a":1}"#).with_header("K", "V"));

        request.reset_response_data();
        request.reset_response_data();
        assert_eq!(request.get_response_code(), -1);
        assert_eq!(request.response_size(), 0);
        assert!(!request.is_valid_json_response());
        assert!(request.get_all_response_headers().is_empty());
        assert_eq!(request.get_response_content_as_string(true), DEPRECATED_RESPONSE_STRING);
        assert_eq!(request.get_response_content_length(), 0);
    }

    #[test]
    fn test_reset_request_data_keeps_configuration() {
        let (request, _) = setup(Settings::default());
        request.set_verb(RequestVerb::Delete);
        request.set_string_request_content("x");
        request.with_request_object(|object| object.set_bool_field("b", true));
        request.reset_request_data();

        assert_eq!(request.get_verb(), RequestVerb::Delete);
        assert!(request.get_request_object().get_field_names().is_empty());
    }

    #[test]
    fn test_tags() {
        let (request, _) = setup(Settings::default());
        request.add_tag("");
        request.add_tag("auth");
        request.add_tag("auth");
        request.add_tag("retry");

        assert!(request.has_tag("auth"));
        assert!(!request.has_tag(""));
        assert_eq!(request.remove_tag("auth"), 1);
        assert_eq!(request.remove_tag("auth"), 0);
        assert!(request.has_tag("retry"));
    }

    #[test]
    fn test_strip_array_wrapper() {
        assert_eq!(strip_array_wrapper(" [{\"a\":1}] "), "{\"a\":1}");
        assert_eq!(strip_array_wrapper("{\"rows\":[1]}"), "{\"rows\":[1]}");
        assert_eq!(strip_array_wrapper("[]"), "");
    }
}
