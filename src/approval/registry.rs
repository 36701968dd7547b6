//! Single-waiter correlation registry
//!
//! Bridges one asynchronous external reply to the one caller waiting for it.
//! A wait opens a correlation window for a key; the first delivery carrying
//! that key closes the window and wakes the caller. If nothing arrives before
//! the deadline the window closes with [`WaitOutcome::TimedOut`].
//!
//! Once a window has closed, by match or by timeout, later deliveries for its
//! key are inert: `resolve` returns `false` and nothing else happens. This
//! models one operator answering one question at a time. A channel that can
//! legitimately deliver several replies concurrently will see all but the
//! first dropped.

use parking_lot::Mutex;
use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors raised by the registry itself
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CorrelationError {
    /// A second wait was opened while one is still outstanding
    #[error("A correlation wait is already outstanding")]
    AlreadyWaiting,
}

/// How a wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<E> {
    /// A matching event arrived
    Matched(E),
    /// The deadline passed first
    TimedOut,
}

impl<E> WaitOutcome<E> {
    /// The matched event, if any
    pub fn into_matched(self) -> Option<E> {
        match self {
            Self::Matched(event) => Some(event),
            Self::TimedOut => None,
        }
    }

    /// Whether the wait timed out
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

struct Window<K, E> {
    key: K,
    id: u64,
    respond: oneshot::Sender<E>,
}

struct Slot<K, E> {
    window: Option<Window<K, E>>,
    next_id: u64,
}

/// Registry holding at most one open correlation window
pub struct CorrelationRegistry<K, E> {
    slot: Mutex<Slot<K, E>>,
}

impl<K, E> Default for CorrelationRegistry<K, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, E> CorrelationRegistry<K, E> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                window: None,
                next_id: 0,
            }),
        }
    }

    /// Whether a window is currently open
    pub fn is_waiting(&self) -> bool {
        self.slot.lock().window.is_some()
    }

    fn close(&self, id: u64) {
        let mut slot = self.slot.lock();
        if slot.window.as_ref().is_some_and(|w| w.id == id) {
            slot.window = None;
        }
    }
}

impl<K: Clone, E> CorrelationRegistry<K, E> {
    /// Key of the open window, if any
    pub fn current_key(&self) -> Option<K> {
        self.slot.lock().window.as_ref().map(|w| w.key.clone())
    }
}

impl<K, E> CorrelationRegistry<K, E>
where
    K: PartialEq + Debug,
{
    /// Wait for the first event delivered under `key`, or time out
    ///
    /// Fails immediately with [`CorrelationError::AlreadyWaiting`] if another
    /// wait is outstanding. Dropping the returned future closes the window.
    pub async fn wait_for(&self, key: K, timeout: Duration) -> Result<WaitOutcome<E>, CorrelationError> {
        let (tx, rx) = oneshot::channel();

        let id = {
            let mut slot = self.slot.lock();
            if slot.window.is_some() {
                return Err(CorrelationError::AlreadyWaiting);
            }
            let id = slot.next_id;
            slot.next_id = slot.next_id.wrapping_add(1);
            tracing::debug!(key = ?key, window = id, timeout_ms = timeout.as_millis() as u64, "Correlation window opened");
            slot.window = Some(Window {
                key,
                id,
                respond: tx,
            });
            id
        };

        let guard = WindowGuard { registry: self, id };

        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(event)) => WaitOutcome::Matched(event),
            // Sender dropped without a value only happens if the window was
            // replaced, which the slot check forbids; treat it as a timeout.
            Ok(Err(_)) | Err(_) => WaitOutcome::TimedOut,
        };

        drop(guard);

        if outcome.is_timeout() {
            tracing::debug!(window = id, "Correlation window timed out");
        }

        Ok(outcome)
    }

    /// Deliver an event under `key`
    ///
    /// Returns `true` if it resolved the open window. Deliveries for any other
    /// key, or while no window is open, are inert and return `false`.
    pub fn resolve(&self, key: &K, event: E) -> bool {
        let window = {
            let mut slot = self.slot.lock();
            match slot.window.as_ref() {
                Some(w) if &w.key == key => slot.window.take(),
                _ => None,
            }
        };

        match window {
            Some(window) => {
                let delivered = window.respond.send(event).is_ok();
                tracing::debug!(key = ?key, window = window.id, delivered, "Correlation window resolved");
                delivered
            }
            None => {
                tracing::debug!(key = ?key, "Ignoring delivery with no matching window");
                false
            }
        }
    }
}

/// Closes the window when the waiting future finishes or is dropped
struct WindowGuard<'a, K, E> {
    registry: &'a CorrelationRegistry<K, E>,
    id: u64,
}

impl<K, E> Drop for WindowGuard<'_, K, E> {
    fn drop(&mut self) {
        self.registry.close(self.id);
    }
}
