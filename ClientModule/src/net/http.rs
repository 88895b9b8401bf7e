//! # Reqwest Transport
//!
//! Sends requests with `reqwest` on a small `tokio` runtime owned by the
//! transport. Finished exchanges are queued and only handed to their
//! completion callbacks when the owning thread calls `pump`, so request
//! state is never touched from a runtime worker.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use log::{debug, info, warn};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, Method, Request, Url};
use tokio::runtime::Runtime;

use worldsbase_shared::{WorldsbaseError, WorldsbaseResult};

use super::{CompletionCallback, HttpRequest, HttpResponse, HttpTransport, TransportResult};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport backed by `reqwest`.
///
/// Must not be dropped from inside an async context, since dropping it
/// shuts down its runtime.
pub struct ReqwestTransport {
    client: Client,
    runtime: Runtime,
    timeout: Duration,
    sender: Sender<(u64, TransportResult)>,
    receiver: Receiver<(u64, TransportResult)>,
    callbacks: RefCell<HashMap<u64, CompletionCallback>>,
    next_ticket: Cell<u64>,
}

impl ReqwestTransport {
    pub fn new() -> WorldsbaseResult<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> WorldsbaseResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("worldsbase-http")
            .enable_all()
            .build()?;

        let client = Client::builder()
            .use_rustls_tls()
            .tcp_keepalive(Duration::from_secs(600))
            .build()
            .map_err(|e| WorldsbaseError::Transport(e.to_string()))?;

        let (sender, receiver) = channel();
        info!("HTTP transport ready (timeout {:?})", timeout);

        Ok(Self {
            client,
            runtime,
            timeout,
            sender,
            receiver,
            callbacks: RefCell::new(HashMap::new()),
            next_ticket: Cell::new(0),
        })
    }

    /// Number of dispatched requests whose callbacks have not run yet
    pub fn in_flight(&self) -> usize {
        self.callbacks.borrow().len()
    }

    /// Deliver every finished exchange to its callback. Returns how many
    /// callbacks ran.
    pub fn pump(&self) -> usize {
        let mut delivered = 0;
        while let Ok((ticket, result)) = self.receiver.try_recv() {
            if self.deliver(ticket, result) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Wait up to `timeout` for at least one exchange to finish, then pump
    pub fn wait_and_pump(&self, timeout: Duration) -> usize {
        match self.receiver.recv_timeout(timeout) {
            Ok((ticket, result)) => {
                let first = usize::from(self.deliver(ticket, result));
                first + self.pump()
            }
            Err(RecvTimeoutError::Timeout) => 0,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("HTTP transport result channel closed");
                0
            }
        }
    }

    fn deliver(&self, ticket: u64, result: TransportResult) -> bool {
        let callback = self.callbacks.borrow_mut().remove(&ticket);
        match callback {
            Some(callback) => {
                callback(result);
                true
            }
            None => {
                warn!("Dropping result for unknown ticket {}", ticket);
                false
            }
        }
    }

    fn build_request(&self, request: &HttpRequest) -> WorldsbaseResult<Request> {
        let method = Method::from_bytes(request.verb.as_bytes())
            .map_err(|_| WorldsbaseError::Transport(format!("invalid verb '{}'", request.verb)))?;
        let url = Url::parse(&request.url).map_err(|_| WorldsbaseError::InvalidUrl(request.url.clone()))?;

        let mut built = Request::new(method, url);
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| WorldsbaseError::Transport(format!("invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| WorldsbaseError::Transport(format!("invalid header value: {}", e)))?;
            built.headers_mut().insert(name, value);
        }
        if !request.body.is_empty() {
            *built.body_mut() = Some(request.body.clone().into());
        }
        *built.timeout_mut() = Some(self.timeout);
        Ok(built)
    }
}

impl HttpTransport for ReqwestTransport {
    fn process(&self, request: HttpRequest, on_complete: CompletionCallback) {
        let ticket = self.next_ticket.get() + 1;
        self.next_ticket.set(ticket);
        self.callbacks.borrow_mut().insert(ticket, on_complete);

        let built = match self.build_request(&request) {
            Ok(built) => built,
            Err(e) => {
                warn!("Could not send {} {}: {}", request.verb, request.url, e);
                let _ = self.sender.send((ticket, TransportResult::failed(None)));
                return;
            }
        };

        debug!("Sending {} {} (ticket {})", request.verb, request.url, ticket);
        let client = self.client.clone();
        let sender = self.sender.clone();
        self.runtime.spawn(async move {
            let result = execute(client, built).await;
            // The receiver is gone only when the transport was dropped
            let _ = sender.send((ticket, result));
        });
    }
}

async fn execute(client: Client, request: Request) -> TransportResult {
    let url = request.url().to_string();
    let response = match client.execute(request).await {
        Ok(response) => response,
        Err(e) => {
            warn!("Request to {} failed: {}", url, e);
            return TransportResult::failed(None);
        }
    };

    let status = i32::from(response.status().as_u16());
    let headers: Vec<String> = response
        .headers()
        .iter()
        .map(|(name, value)| format!("{}: {}", name.as_str(), String::from_utf8_lossy(value.as_bytes())))
        .collect();
    let announced = response.content_length();

    match response.bytes().await {
        Ok(body) => {
            let body = body.to_vec();
            let content_length = announced.map_or(body.len(), |len| len as usize);
            TransportResult::completed(HttpResponse {
                status,
                headers,
                body,
                content_length,
            })
        }
        Err(e) => {
            warn!("Reading response body from {} failed: {}", url, e);
            TransportResult::failed(Some(HttpResponse {
                status,
                headers,
                body: Vec::new(),
                content_length: 0,
            }))
        }
    }
}
