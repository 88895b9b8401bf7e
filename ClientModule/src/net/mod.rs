//! # Network Module
//!
//! The transport seam between the request lifecycle and the network. A
//! transport takes a fully built `HttpRequest` and later reports a
//! `TransportResult` through a one-shot completion callback. Callbacks are
//! delivered on the thread that drives the transport, never concurrently
//! with the caller.
//!
//! Two transports are provided:
//!
//! - `ManualTransport` queues requests until the host completes them
//! - `ReqwestTransport` performs requests with `reqwest` and hands results
//!   back through `pump`

pub mod manual;
pub mod http;

pub use manual::ManualTransport;
pub use http::ReqwestTransport;

/// Callback invoked exactly once when a dispatched request finishes
pub type CompletionCallback = Box<dyn FnOnce(TransportResult) + 'static>;

/// Anything able to carry a request to a server and report back
pub trait HttpTransport {
    /// Start `request`; `on_complete` fires when it finishes or fails
    fn process(&self, request: HttpRequest, on_complete: CompletionCallback);
}

/// A request as it goes out on the wire
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    pub verb: String,
    pub url: String,
    /// Header name and value pairs in the order they were first set
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(verb: &str, url: &str) -> Self {
        Self {
            verb: verb.to_string(),
            url: url.to_string(),
            ..Default::default()
        }
    }

    /// Set a header, replacing any earlier value with the same name.
    /// Names compare case-insensitively.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_as_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A response received from the server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: i32,
    /// Headers formatted as `"Key: Value"`
    pub headers: Vec<String>,
    pub body: Vec<u8>,
    /// Length announced by the server, or the body length when absent
    pub content_length: usize,
}

impl HttpResponse {
    pub fn new(status: i32, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        Self {
            status,
            headers: Vec::new(),
            content_length: body.len(),
            body,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push(format!("{}: {}", name, value));
        self
    }
}

/// Outcome reported to a completion callback
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportResult {
    /// Whether the exchange completed at the transport level
    pub success: bool,
    /// Absent when no response was received at all
    pub response: Option<HttpResponse>,
}

impl TransportResult {
    pub fn completed(response: HttpResponse) -> Self {
        Self {
            success: true,
            response: Some(response),
        }
    }

    /// The transport gave up, possibly after receiving a response
    pub fn failed(response: Option<HttpResponse>) -> Self {
        Self {
            success: false,
            response,
        }
    }
}
