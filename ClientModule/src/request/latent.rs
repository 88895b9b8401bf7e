//! # Suspended Continuations
//!
//! `RequestJson::apply_url` hands the caller a `ResponseFuture` and keeps
//! the sending half as a `Continuation`. Completion resolves the future with
//! the response object; dropping the continuation (cancel or replacement)
//! resolves it with `WorldsbaseError::Cancelled`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use log::debug;
use tokio::sync::oneshot::{self, error::TryRecvError};

use worldsbase_shared::{WorldsbaseError, WorldsbaseResult};

use crate::json::JsonObject;

/// Sending half held by the request while a caller awaits completion
#[derive(Debug)]
pub(crate) struct Continuation {
    id: u64,
    sender: oneshot::Sender<WorldsbaseResult<JsonObject>>,
}

impl Continuation {
    pub(crate) fn new(id: u64) -> (Self, ResponseFuture) {
        let (sender, receiver) = oneshot::channel();
        (Self { id, sender }, ResponseFuture { id, receiver })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Resolve the waiting future. A caller that stopped waiting is ignored.
    pub(crate) fn resolve(self, result: WorldsbaseResult<JsonObject>) {
        if self.sender.send(result).is_err() {
            debug!("Continuation {} was no longer awaited", self.id);
        }
    }
}

/// Future returned by `RequestJson::apply_url`
#[derive(Debug)]
pub struct ResponseFuture {
    id: u64,
    receiver: oneshot::Receiver<WorldsbaseResult<JsonObject>>,
}

impl ResponseFuture {
    /// Identity of the dispatch this future waits on
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Non-blocking check for hosts that poll from a frame loop.
    /// `None` while the request is still in flight.
    pub fn try_take(&mut self) -> Option<WorldsbaseResult<JsonObject>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(WorldsbaseError::Cancelled)),
        }
    }
}

impl Future for ResponseFuture {
    type Output = WorldsbaseResult<JsonObject>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(WorldsbaseError::Cancelled)))
    }
}
