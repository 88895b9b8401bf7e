//! # Manual Transport
//!
//! Holds dispatched requests until the host completes them. Useful for
//! hosts that drive the network themselves and for exercising the request
//! lifecycle without sockets.

use std::cell::{Cell, RefCell};

use log::{debug, warn};

use super::{CompletionCallback, HttpRequest, HttpResponse, HttpTransport, TransportResult};

struct PendingRequest {
    ticket: u64,
    request: HttpRequest,
    on_complete: CompletionCallback,
}

#[derive(Default)]
pub struct ManualTransport {
    pending: RefCell<Vec<PendingRequest>>,
    next_ticket: Cell<u64>,
}

impl ManualTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tickets and requests still waiting for completion, oldest first
    pub fn pending(&self) -> Vec<(u64, HttpRequest)> {
        self.pending
            .borrow()
            .iter()
            .map(|p| (p.ticket, p.request.clone()))
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Most recently dispatched request that is still pending
    pub fn last_request(&self) -> Option<(u64, HttpRequest)> {
        self.pending
            .borrow()
            .last()
            .map(|p| (p.ticket, p.request.clone()))
    }

    /// Deliver a response for `ticket`. Returns false for an unknown ticket.
    pub fn complete(&self, ticket: u64, response: HttpResponse) -> bool {
        self.deliver(ticket, TransportResult::completed(response))
    }

    /// Report a transport failure for `ticket`
    pub fn fail(&self, ticket: u64, response: Option<HttpResponse>) -> bool {
        self.deliver(ticket, TransportResult::failed(response))
    }

    /// Deliver a response for the oldest pending request
    pub fn complete_next(&self, response: HttpResponse) -> bool {
        let ticket = self.pending.borrow().first().map(|p| p.ticket);
        match ticket {
            Some(ticket) => self.complete(ticket, response),
            None => false,
        }
    }

    fn deliver(&self, ticket: u64, result: TransportResult) -> bool {
        // Release the queue before the callback runs; it may dispatch again
        let entry = {
            let mut pending = self.pending.borrow_mut();
            pending
                .iter()
                .position(|p| p.ticket == ticket)
                .map(|index| pending.remove(index))
        };

        match entry {
            Some(entry) => {
                debug!("Completing request {} {} (ticket {})", entry.request.verb, entry.request.url, ticket);
                (entry.on_complete)(result);
                true
            }
            None => {
                warn!("No pending request with ticket {}", ticket);
                false
            }
        }
    }
}

impl HttpTransport for ManualTransport {
    fn process(&self, request: HttpRequest, on_complete: CompletionCallback) {
        let ticket = self.next_ticket.get() + 1;
        self.next_ticket.set(ticket);
        debug!("Queued request {} {} as ticket {}", request.verb, request.url, ticket);
        self.pending.borrow_mut().push(PendingRequest {
            ticket,
            request,
            on_complete,
        });
    }
}
