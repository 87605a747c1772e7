//! Multi-stream polling scheduler.
//!
//! One independent refresh loop per subscription key, stale-while-error
//! views, and focus-driven revalidation. Results are applied only when
//! their generation tag is still current, so a slow response can never
//! overwrite a newer one or touch a torn-down subscription.

mod subscription;

pub use subscription::{FeedStatus, FeedView, SubscriptionHandle};

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::market_data::types::FetchError;
use subscription::{boxed_fetch, Subscription};

/// Default age after which a focus event triggers a refetch.
pub const DEFAULT_REVALIDATE_AFTER: Duration = Duration::from_secs(5);

// Type-erased view of a subscription for the scheduler's registry.
trait Poller: Send + Sync {
    fn revalidate_if_stale(self: Arc<Self>, threshold: Duration) -> bool;
    fn shutdown(&self);
}

impl<T: Send + Sync + 'static> Poller for Subscription<T> {
    fn revalidate_if_stale(self: Arc<Self>, threshold: Duration) -> bool {
        if !self.is_live() || !self.is_stale(threshold) {
            return false;
        }
        debug!(key = %self.key(), "revalidating on focus");
        tokio::spawn(async move { self.issue().await });
        true
    }

    fn shutdown(&self) {
        Subscription::shutdown(self);
    }
}

struct Entry {
    poller: Arc<dyn Poller>,
    task: JoinHandle<()>,
}

impl Entry {
    fn ptr(&self) -> *const () {
        Arc::as_ptr(&self.poller) as *const ()
    }
}

pub struct PollingScheduler {
    entries: Mutex<HashMap<String, Entry>>,
    revalidate_after: Duration,
}

impl Default for PollingScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_REVALIDATE_AFTER)
    }
}

impl PollingScheduler {
    pub fn new(revalidate_after: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            revalidate_after,
        }
    }

    /// Start polling `fetch` every `interval` under `key`. The first fetch is
    /// issued immediately. Subscribing an existing key replaces (and stops)
    /// the previous subscription.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe<T, F, Fut>(
        &self,
        key: impl Into<String>,
        fetch: F,
        interval: Duration,
    ) -> SubscriptionHandle<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let key = key.into();
        let sub = Arc::new(Subscription::new(key.clone(), interval, boxed_fetch(fetch)));
        let handle = SubscriptionHandle::new(Arc::clone(&sub));
        let task = tokio::spawn(Arc::clone(&sub).run());

        let previous = self.entries.lock().insert(
            key.clone(),
            Entry {
                poller: sub,
                task,
            },
        );
        if let Some(previous) = previous {
            info!(%key, "replacing existing subscription");
            previous.poller.shutdown();
        }
        info!(%key, interval_ms = interval.as_millis() as u64, "subscribed");
        handle
    }

    /// Stop polling and make the subscription inert. No consumer
    /// notification happens after this returns.
    pub fn unsubscribe<T: Send + Sync + 'static>(&self, handle: SubscriptionHandle<T>) {
        handle.inner.shutdown();

        let ptr = Arc::as_ptr(&handle.inner) as *const ();
        let mut entries = self.entries.lock();
        if entries.get(handle.key()).is_some_and(|e| e.ptr() == ptr) {
            entries.remove(handle.key());
        }
        info!(key = %handle.key(), "unsubscribed");
    }

    /// Host regained foreground focus: refetch every subscription whose data
    /// is older than the revalidation threshold. Regular timers are left
    /// alone. Returns how many fetches were issued.
    pub fn focus_regained(&self) -> usize {
        let pollers: Vec<Arc<dyn Poller>> = self
            .entries
            .lock()
            .values()
            .map(|e| Arc::clone(&e.poller))
            .collect();

        let issued = pollers
            .into_iter()
            .filter(|p| Arc::clone(p).revalidate_if_stale(self.revalidate_after))
            .count();
        debug!(issued, "focus regained");
        issued
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Stop every subscription.
    pub fn shutdown(&self) {
        let drained: Vec<Entry> = self.entries.lock().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.poller.shutdown();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "scheduler shut down");
        }
    }

    /// Whether the polling loop registered under `key` is still running.
    pub fn is_running(&self, key: &str) -> bool {
        self.entries
            .lock()
            .get(key)
            .is_some_and(|e| !e.task.is_finished())
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
