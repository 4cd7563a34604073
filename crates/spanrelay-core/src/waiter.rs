//! Single-waiter notification registry.
//!
//! Each correlation key holds at most one registered wait handle at a time.
//! A poller that finds nothing buffered registers a handle and suspends on
//! it; a reporter that appends a record atomically removes the handle and
//! notifies it, so a handle is notified at most once.
//!
//! Registration is guard-based: dropping the [`WaitGuard`] deregisters the
//! handle whether the wait ended by notification, by timeout, or by the
//! caller cancelling the fetch outright. The removal matches on handle
//! identity, so a guard never evicts a registration that replaced its own.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Notify;

/// Registry of pending waiters, one per correlation key.
pub struct WaitRegistry {
    waiters: DashMap<String, Arc<Notify>>,
}

impl WaitRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            waiters: DashMap::new(),
        }
    }

    /// Register a wait handle for a key, returning its deregistration guard.
    ///
    /// At most one handle is registered per key: a second registration for
    /// the same key replaces the first and wakes the displaced handle, so
    /// the earlier waiter re-checks the buffer instead of sleeping out its
    /// timeout. Callers should still arrange for at most one outstanding
    /// fetch per key; see [`crate::SpanRelay::fetch`].
    pub fn register(&self, key: &str) -> WaitGuard<'_> {
        let handle = Arc::new(Notify::new());
        if let Some(displaced) = self.waiters.insert(key.to_string(), handle.clone()) {
            displaced.notify_one();
        }
        WaitGuard {
            registry: self,
            key: key.to_string(),
            handle,
        }
    }

    /// Atomically remove and return the handle registered for a key.
    ///
    /// Of any number of concurrent reporters for the same key, exactly one
    /// obtains the handle, so it is notified at most once.
    pub fn take(&self, key: &str) -> Option<Arc<Notify>> {
        self.waiters.remove(key).map(|(_, handle)| handle)
    }

    /// Remove and wake every registered waiter. Returns the number woken.
    ///
    /// Used at service shutdown to release pending fetches; each wakes,
    /// drains whatever is buffered, and returns.
    pub fn wake_all(&self) -> usize {
        let keys: Vec<String> = self.waiters.iter().map(|e| e.key().clone()).collect();
        let mut woken = 0;
        for key in keys {
            if let Some((_, handle)) = self.waiters.remove(&key) {
                handle.notify_one();
                woken += 1;
            }
        }
        woken
    }

    /// Number of currently registered waiters.
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Whether no waiter is registered.
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

impl Default for WaitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deregistration guard for a registered wait handle.
pub struct WaitGuard<'a> {
    registry: &'a WaitRegistry,
    key: String,
    handle: Arc<Notify>,
}

impl WaitGuard<'_> {
    /// Suspend until the handle is notified.
    ///
    /// A notification delivered between registration and this await is not
    /// lost: `Notify` stores the permit and the await completes immediately.
    pub async fn notified(&self) {
        self.handle.notified().await;
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        // Idempotent: a notifier or a replacing waiter may already have
        // removed the entry; match on handle identity so a replacement
        // registration is left untouched.
        self.registry
            .waiters
            .remove_if(&self.key, |_, handle| Arc::ptr_eq(handle, &self.handle));
    }
}
