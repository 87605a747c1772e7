// In-memory provider for tests: answers each request kind from a queue of
// scripted results, optionally after a delay.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::{MarketDataProvider, MarketRequest, MarketSnapshot};
use crate::market_data::types::FetchError;

type Scripted = (Duration, Result<MarketSnapshot, FetchError>);

#[derive(Default)]
pub struct ScriptedProvider {
    prices: Mutex<VecDeque<Scripted>>,
    tickers: Mutex<VecDeque<Scripted>>,
    baskets: Mutex<VecDeque<Scripted>>,
    pub calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, request: &MarketRequest) -> &Mutex<VecDeque<Scripted>> {
        match request {
            MarketRequest::Price { .. } => &self.prices,
            MarketRequest::Ticker24h { .. } => &self.tickers,
            MarketRequest::AllTickers => &self.baskets,
        }
    }

    pub fn push(&self, request: &MarketRequest, result: Result<MarketSnapshot, FetchError>) {
        self.push_delayed(request, Duration::ZERO, result);
    }

    pub fn push_delayed(
        &self,
        request: &MarketRequest,
        delay: Duration,
        result: Result<MarketSnapshot, FetchError>,
    ) {
        self.queue(request).lock().push_back((delay, result));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for ScriptedProvider {
    async fn fetch(&self, request: MarketRequest) -> Result<MarketSnapshot, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.queue(&request).lock().pop_front();
        match next {
            Some((delay, result)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                result
            }
            None => Err(FetchError::Transport {
                what: "scripted",
                status: 503,
                message: " (script exhausted)".to_string(),
            }),
        }
    }
}
