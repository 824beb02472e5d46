//! Debounce scheduler
//!
//! Coalesces a burst of change notifications for one key into a single
//! delayed action. Every call to [`Debouncer::schedule`] cancels the
//! outstanding timer for that key and starts a new one, so the action only
//! runs once the stream has been quiet for the whole delay. A stream that
//! never pauses defers the action indefinitely.
//!
//! The registry belongs to one watch session: fired timers remove
//! themselves, and [`Debouncer::shutdown`] cancels whatever is still
//! pending when the session ends.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

struct PendingTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

type Timers<K> = Arc<Mutex<HashMap<K, PendingTimer>>>;

/// Per-key debounce timers
pub struct Debouncer<K> {
    timers: Timers<K>,
    generation: AtomicU64,
    closed: AtomicBool,
}

impl<K> Debug for Debouncer<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<K> Default for Debouncer<K>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// (Re)start the timer for `key`; `action` runs once `delay` passes
    /// without another call for the same key
    ///
    /// Must be called from within a tokio runtime. The action runs on its
    /// own task, so a later reschedule never cancels an action that has
    /// already started.
    pub fn schedule<F, Fut>(&self, key: K, delay: Duration, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            tracing::debug!(?key, "Debouncer shut down, dropping event");
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let timers = Arc::clone(&self.timers);
        let timer_key = key.clone();

        let Ok(mut map) = self.timers.lock() else {
            tracing::error!("Debounce registry lock poisoned");
            return;
        };

        if let Some(previous) = map.remove(&key) {
            tracing::trace!(?key, "Clearing existing timeout");
            previous.handle.abort();
        }

        tracing::trace!(?key, ?delay, "Setting new timeout");
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if let Ok(mut map) = timers.lock() {
                if map
                    .get(&timer_key)
                    .is_some_and(|t| t.generation == generation)
                {
                    map.remove(&timer_key);
                }
            }

            tokio::spawn(action());
        });

        map.insert(key, PendingTimer { generation, handle });
    }

    /// Cancel the pending timer for `key`, returning whether one existed
    pub fn cancel(&self, key: &K) -> bool {
        match self.timers.lock() {
            Ok(mut map) => map.remove(key).map(|t| t.handle.abort()).is_some(),
            Err(_) => false,
        }
    }

    /// Number of timers that have not fired yet
    pub fn pending(&self) -> usize {
        self.timers.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Cancel every pending timer and refuse new ones
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut map) = self.timers.lock() {
            for (key, timer) in map.drain() {
                tracing::debug!(?key, "Cancelling pending debounce timer");
                timer.handle.abort();
            }
        }
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        if let Ok(mut map) = self.timers.lock() {
            for (_, timer) in map.drain() {
                timer.handle.abort();
            }
        }
    }
}
