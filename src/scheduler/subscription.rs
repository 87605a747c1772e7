// One polling subscription: its fetch operation, generation counter and the
// watch channel consumers observe.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::market_data::types::FetchError;

/// What a consumer sees for one subscription.
#[derive(Debug)]
pub struct FeedView<T> {
    /// Last successfully fetched value; kept when a later fetch fails.
    pub value: Option<Arc<T>>,
    /// Error of the most recent settled fetch, cleared by the next success.
    pub error: Option<FetchError>,
    /// A fetch for the current generation is outstanding.
    pub is_loading: bool,
    pub last_fetched_at: Option<Instant>,
    /// Generation of the fetch that produced this view.
    pub generation: u64,
}

impl<T> Clone for FeedView<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            error: self.error.clone(),
            is_loading: self.is_loading,
            last_fetched_at: self.last_fetched_at,
            generation: self.generation,
        }
    }
}

impl<T> Default for FeedView<T> {
    fn default() -> Self {
        Self {
            value: None,
            error: None,
            is_loading: false,
            last_fetched_at: None,
            generation: 0,
        }
    }
}

/// Consumer-facing reading of a view.
#[derive(Debug)]
pub enum FeedStatus<'a, T> {
    /// No successful poll yet and nothing failed: render a loading state.
    NoDataYet,
    /// The latest fetch failed; `stale` is the last good value, if any.
    Failed {
        error: &'a FetchError,
        stale: Option<&'a T>,
    },
    Ready(&'a T),
}

impl<T> FeedView<T> {
    pub fn status(&self) -> FeedStatus<'_, T> {
        match (&self.error, &self.value) {
            (Some(error), stale) => FeedStatus::Failed {
                error,
                stale: stale.as_deref(),
            },
            (None, Some(value)) => FeedStatus::Ready(value),
            (None, None) => FeedStatus::NoDataYet,
        }
    }

    pub fn has_data(&self) -> bool {
        self.value.is_some()
    }
}

pub(crate) type FetchFn<T> =
    Box<dyn Fn() -> BoxFuture<'static, Result<T, FetchError>> + Send + Sync>;

pub(crate) fn boxed_fetch<T, F, Fut>(fetch: F) -> FetchFn<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
{
    Box::new(move || fetch().boxed())
}

pub(crate) struct Subscription<T> {
    key: String,
    interval: Duration,
    fetch: FetchFn<T>,
    generation: AtomicU64,
    live: AtomicBool,
    stop: Notify,
    state: watch::Sender<FeedView<T>>,
}

impl<T: Send + Sync + 'static> Subscription<T> {
    pub(crate) fn new(key: String, interval: Duration, fetch: FetchFn<T>) -> Self {
        let (state, _) = watch::channel(FeedView::default());
        Self {
            key,
            interval,
            fetch,
            generation: AtomicU64::new(0),
            live: AtomicBool::new(true),
            stop: Notify::new(),
            state,
        }
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn watch(&self) -> watch::Receiver<FeedView<T>> {
        self.state.subscribe()
    }

    pub(crate) fn view(&self) -> FeedView<T> {
        self.state.borrow().clone()
    }

    pub(crate) fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Regular cadence: fetch, then wait `interval` from the moment the fetch
    /// settled. Regular fetches for one key never overlap.
    pub(crate) async fn run(self: Arc<Self>) {
        debug!(key = %self.key, interval_ms = self.interval.as_millis() as u64, "polling started");
        while self.is_live() {
            self.issue().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.stop.notified() => break,
            }
        }
        debug!(key = %self.key, "polling stopped");
    }

    /// Issue one fetch tagged with a fresh generation and apply its result
    /// if that generation is still current when it settles.
    pub(crate) async fn issue(&self) {
        let Some(generation) = self.begin() else {
            return;
        };
        trace!(key = %self.key, generation, "fetch issued");
        let result = (self.fetch)().await;
        self.settle(generation, result);
    }

    // Generation bump and loading flag happen under the watch lock so they
    // serialize with `settle` and `shutdown`.
    fn begin(&self) -> Option<u64> {
        let mut issued = None;
        self.state.send_if_modified(|view| {
            if !self.is_live() {
                return false;
            }
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            issued = Some(generation);
            let changed = !view.is_loading;
            view.is_loading = true;
            changed
        });
        issued
    }

    fn settle(&self, generation: u64, result: Result<T, FetchError>) {
        let mut outcome = None;
        self.state.send_if_modified(|view| {
            if !self.is_live() || generation != self.current_generation() {
                return false;
            }
            match result {
                Ok(value) => {
                    view.value = Some(Arc::new(value));
                    view.error = None;
                    view.last_fetched_at = Some(Instant::now());
                    outcome = Some("ok");
                }
                Err(err) => {
                    warn!(key = %self.key, generation, error = %err, "fetch failed, keeping last value");
                    view.error = Some(err);
                    outcome = Some("error");
                }
            }
            view.is_loading = false;
            view.generation = generation;
            true
        });

        if let Some(outcome) = outcome {
            metrics::counter!("pulse_fetch_total", "key" => self.key.clone(), "outcome" => outcome)
                .increment(1);
        } else {
            debug!(key = %self.key, generation, current = self.current_generation(), "discarding superseded fetch result");
            metrics::counter!("pulse_fetch_discarded_total", "key" => self.key.clone()).increment(1);
        }
    }

    /// Stale means older than `threshold`, or never fetched with nothing in
    /// flight.
    pub(crate) fn is_stale(&self, threshold: Duration) -> bool {
        let view = self.state.borrow();
        match view.last_fetched_at {
            Some(at) => at.elapsed() > threshold,
            None => !view.is_loading,
        }
    }

    /// Stop the timer and make every later result inert. An in-flight fetch
    /// keeps running; `settle` drops its result.
    pub(crate) fn shutdown(&self) {
        self.state.send_if_modified(|_| {
            self.live.store(false, Ordering::SeqCst);
            false
        });
        self.stop.notify_one();
    }
}

/// Handle returned by `PollingScheduler::subscribe`.
pub struct SubscriptionHandle<T> {
    pub(crate) inner: Arc<Subscription<T>>,
    rx: watch::Receiver<FeedView<T>>,
}

impl<T: Send + Sync + 'static> SubscriptionHandle<T> {
    pub(crate) fn new(inner: Arc<Subscription<T>>) -> Self {
        let rx = inner.watch();
        Self { inner, rx }
    }

    pub fn key(&self) -> &str {
        self.inner.key()
    }

    /// Snapshot of the current view.
    pub fn view(&self) -> FeedView<T> {
        self.inner.view()
    }

    /// Wait for the next visible change. Returns `false` once the
    /// subscription is gone for good.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Independent receiver for push-style consumers.
    pub fn watch(&self) -> watch::Receiver<FeedView<T>> {
        self.inner.watch()
    }

    pub fn is_live(&self) -> bool {
        self.inner.is_live()
    }
}
