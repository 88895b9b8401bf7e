//! # Process-wide Request Listeners
//!
//! Listeners registered here observe every `RequestJson` in the process.
//! They run after a request's own listeners and before its continuation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;
use once_cell::sync::Lazy;

use super::RequestJson;

/// Handle returned on registration, used to remove the listener again
pub type ListenerId = u64;

type StaticListenerFn = Arc<dyn Fn(&RequestJson) + Send + Sync + 'static>;

// Listener registries
static ON_STATIC_REQUEST_COMPLETE: Lazy<Mutex<Vec<(ListenerId, StaticListenerFn)>>> =
    Lazy::new(|| Mutex::new(Vec::new()));
static ON_STATIC_REQUEST_FAIL: Lazy<Mutex<Vec<(ListenerId, StaticListenerFn)>>> =
    Lazy::new(|| Mutex::new(Vec::new()));

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Observe every successful completion in the process
pub fn add_static_complete_listener(
    listener: impl Fn(&RequestJson) + Send + Sync + 'static,
) -> ListenerId {
    register(&ON_STATIC_REQUEST_COMPLETE, Arc::new(listener))
}

/// Observe every failed request in the process
pub fn add_static_fail_listener(
    listener: impl Fn(&RequestJson) + Send + Sync + 'static,
) -> ListenerId {
    register(&ON_STATIC_REQUEST_FAIL, Arc::new(listener))
}

/// Remove a listener from either registry. Returns whether it was found.
pub fn remove_static_listener(id: ListenerId) -> bool {
    [&ON_STATIC_REQUEST_COMPLETE, &ON_STATIC_REQUEST_FAIL]
        .into_iter()
        .any(|registry| {
            let mut listeners = registry.lock().unwrap_or_else(PoisonError::into_inner);
            let before = listeners.len();
            listeners.retain(|(existing, _)| *existing != id);
            listeners.len() != before
        })
}

pub(crate) fn broadcast_complete(request: &RequestJson) {
    broadcast(&ON_STATIC_REQUEST_COMPLETE, request);
}

pub(crate) fn broadcast_fail(request: &RequestJson) {
    broadcast(&ON_STATIC_REQUEST_FAIL, request);
}

fn register(registry: &Mutex<Vec<(ListenerId, StaticListenerFn)>>, listener: StaticListenerFn) -> ListenerId {
    let id = NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed);
    registry
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push((id, listener));
    debug!("Registered static request listener {}", id);
    id
}

fn broadcast(registry: &Mutex<Vec<(ListenerId, StaticListenerFn)>>, request: &RequestJson) {
    // Snapshot so listeners can register or remove listeners themselves
    let listeners: Vec<StaticListenerFn> = registry
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|(_, listener)| listener.clone())
        .collect();

    for listener in listeners {
        listener(request);
    }
}
