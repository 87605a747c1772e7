// Router wires provider -> scheduler -> engines -> dashboard events
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::Settings;
use crate::engine::basket::compute_basket_metrics;
use crate::engine::monitor::{combine_views, MonitorState};
use crate::engine::tick::{spawn_classifier, TickSignal};
use crate::engine::types::DerivedTicker;
use crate::market_data::adapters::MarketDataProvider;
use crate::market_data::types::{FetchError, PriceSample, TickerSnapshot};
use crate::scheduler::{FeedStatus, FeedView, PollingScheduler, SubscriptionHandle};

const EVENT_BUFFER: usize = 256;

/// Basket panel state.
#[derive(Debug, Clone, PartialEq)]
pub enum BasketState {
    Loading,
    Failed(FetchError),
    Ready(Arc<Vec<DerivedTicker>>),
}

impl BasketState {
    pub fn from_view(view: &FeedView<Vec<DerivedTicker>>) -> Self {
        match view.status() {
            FeedStatus::Failed { error, .. } => BasketState::Failed(error.clone()),
            FeedStatus::Ready(basket) if !basket.is_empty() => {
                BasketState::Ready(view.value.clone().unwrap_or_default())
            }
            _ => BasketState::Loading,
        }
    }
}

/// Everything the presentation layer needs to redraw.
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardEvent {
    Basket(BasketState),
    Monitor(MonitorState),
    Flash(TickSignal),
}

pub fn basket_key() -> String {
    "top-cryptocurrencies".to_string()
}

pub fn ticker_key(symbol: &str) -> String {
    format!("futures-24h-{}", symbol)
}

pub fn price_key(symbol: &str) -> String {
    format!("futures-price-{}", symbol)
}

pub struct Dashboard {
    scheduler: PollingScheduler,
    basket: SubscriptionHandle<Vec<DerivedTicker>>,
    ticker: SubscriptionHandle<TickerSnapshot>,
    price: SubscriptionHandle<PriceSample>,
    forwarder: JoinHandle<()>,
    classifier: JoinHandle<()>,
}

impl Dashboard {
    /// Subscribe the three feeds and start routing. Must be called from
    /// within a tokio runtime.
    pub fn start(
        provider: Arc<dyn MarketDataProvider>,
        settings: &Settings,
    ) -> (Self, mpsc::Receiver<DashboardEvent>) {
        let scheduler = PollingScheduler::new(settings.revalidate_after());
        let symbol = settings.monitor.symbol.to_uppercase();
        let universe = Arc::new(settings.universe());

        let basket = {
            let provider = Arc::clone(&provider);
            let universe = Arc::clone(&universe);
            scheduler.subscribe(
                basket_key(),
                move || {
                    let provider = Arc::clone(&provider);
                    let universe = Arc::clone(&universe);
                    async move {
                        let raw = provider.all_tickers().await?;
                        let basket = compute_basket_metrics(&raw, &universe);
                        metrics::gauge!("pulse_basket_size").set(basket.len() as f64);
                        Ok(basket)
                    }
                },
                settings.basket_interval(),
            )
        };

        let ticker = {
            let provider = Arc::clone(&provider);
            let symbol = symbol.clone();
            scheduler.subscribe(
                ticker_key(&symbol),
                move || {
                    let provider = Arc::clone(&provider);
                    let symbol = symbol.clone();
                    async move { provider.ticker_24h(&symbol).await }
                },
                settings.ticker_interval(),
            )
        };

        let price = {
            let provider = Arc::clone(&provider);
            let symbol = symbol.clone();
            scheduler.subscribe(
                price_key(&symbol),
                move || {
                    let provider = Arc::clone(&provider);
                    let symbol = symbol.clone();
                    async move { provider.price(&symbol).await }
                },
                settings.price_interval(),
            )
        };

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (sample_tx, sample_rx) = mpsc::channel(EVENT_BUFFER);
        let (signal_tx, signal_rx) = mpsc::channel(EVENT_BUFFER);

        let classifier = spawn_classifier(sample_rx, signal_tx, settings.flash_duration());
        let forwarder = tokio::spawn(forward(
            basket.watch(),
            ticker.watch(),
            price.watch(),
            sample_tx,
            signal_rx,
            event_tx,
        ));

        info!(%symbol, universe = universe.len(), "dashboard started");
        (
            Self {
                scheduler,
                basket,
                ticker,
                price,
                forwarder,
                classifier,
            },
            event_rx,
        )
    }

    pub fn focus_regained(&self) -> usize {
        self.scheduler.focus_regained()
    }

    pub fn basket(&self) -> BasketState {
        BasketState::from_view(&self.basket.view())
    }

    pub fn monitor(&self) -> MonitorState {
        combine_views(&self.ticker.view(), &self.price.view())
    }

    /// Stop all polling and timers; no event is emitted afterwards.
    pub fn shutdown(self) {
        self.forwarder.abort();
        self.classifier.abort();
        self.scheduler.unsubscribe(self.basket);
        self.scheduler.unsubscribe(self.ticker);
        self.scheduler.unsubscribe(self.price);
        info!("dashboard stopped");
    }
}

async fn forward(
    mut basket: watch::Receiver<FeedView<Vec<DerivedTicker>>>,
    mut ticker: watch::Receiver<FeedView<TickerSnapshot>>,
    mut price: watch::Receiver<FeedView<PriceSample>>,
    samples: mpsc::Sender<PriceSample>,
    mut signals: mpsc::Receiver<TickSignal>,
    events: mpsc::Sender<DashboardEvent>,
) {
    let mut last_sample_at: Option<Instant> = None;

    loop {
        let event = tokio::select! {
            changed = basket.changed() => {
                if changed.is_err() { break; }
                let view = basket.borrow_and_update().clone();
                DashboardEvent::Basket(BasketState::from_view(&view))
            }
            changed = ticker.changed() => {
                if changed.is_err() { break; }
                let ticker_view = ticker.borrow_and_update().clone();
                let price_view = price.borrow().clone();
                DashboardEvent::Monitor(combine_views(&ticker_view, &price_view))
            }
            changed = price.changed() => {
                if changed.is_err() { break; }
                let price_view = price.borrow_and_update().clone();
                // one classifier sample per successful poll
                if price_view.last_fetched_at != last_sample_at {
                    last_sample_at = price_view.last_fetched_at;
                    if let Some(sample) = price_view.value.as_deref() {
                        if samples.send(sample.clone()).await.is_err() {
                            break;
                        }
                    }
                }
                let ticker_view = ticker.borrow().clone();
                DashboardEvent::Monitor(combine_views(&ticker_view, &price_view))
            }
            Some(signal) = signals.recv() => DashboardEvent::Flash(signal),
        };

        if events.send(event).await.is_err() {
            break;
        }
    }
    debug!("dashboard forwarder stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::Direction;
    use crate::market_data::adapters::scripted::ScriptedProvider;
    use crate::market_data::adapters::{MarketRequest, MarketSnapshot};
    use crate::market_data::types::fixtures::{price, ticker};
    use std::time::Duration;

    fn settings() -> Settings {
        let mut s = Settings::default();
        s.basket.symbols = vec!["BTCUSDT".into(), "ETHUSDT".into()];
        s
    }

    fn price_req() -> MarketRequest {
        MarketRequest::Price { symbol: "BTCUSDT".into() }
    }

    fn ticker_req() -> MarketRequest {
        MarketRequest::Ticker24h { symbol: "BTCUSDT".into() }
    }

    async fn next_matching(
        events: &mut mpsc::Receiver<DashboardEvent>,
        pred: impl Fn(&DashboardEvent) -> bool,
    ) -> DashboardEvent {
        loop {
            let event = events.recv().await.expect("dashboard closed");
            if pred(&event) {
                return event;
            }
        }
    }

    #[test]
    fn test_subscription_keys() {
        assert_eq!(ticker_key("BTCUSDT"), "futures-24h-BTCUSDT");
        assert_eq!(price_key("BTCUSDT"), "futures-price-BTCUSDT");
        assert_eq!(basket_key(), "top-cryptocurrencies");
    }

    #[test]
    fn test_empty_basket_reads_as_loading() {
        let view = FeedView {
            value: Some(Arc::new(Vec::new())),
            ..Default::default()
        };
        assert_eq!(BasketState::from_view(&view), BasketState::Loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_basket_is_ranked_and_weighted() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push(
            &MarketRequest::AllTickers,
            Ok(MarketSnapshot::Tickers(vec![
                ticker("ETHUSDT", 250.0),
                ticker("XYZUSDT", 9_999.0),
                ticker("BTCUSDT", 750.0),
            ])),
        );

        let (dashboard, mut events) = Dashboard::start(provider, &settings());
        let event = next_matching(&mut events, |e| {
            matches!(e, DashboardEvent::Basket(BasketState::Ready(_)))
        })
        .await;

        let DashboardEvent::Basket(BasketState::Ready(basket)) = event else {
            unreachable!()
        };
        let symbols: Vec<&str> = basket.iter().map(|t| t.symbol()).collect();
        assert_eq!(symbols, ["BTCUSDT", "ETHUSDT"]);
        assert_eq!(basket[0].market_weight, 75.0);
        assert_eq!(basket[1].market_weight, 25.0);
        dashboard.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_price_ticks_raise_flash_then_decay() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push(&ticker_req(), Ok(MarketSnapshot::Ticker(ticker("BTCUSDT", 1.0))));
        provider.push(&price_req(), Ok(MarketSnapshot::Price(price("BTCUSDT", 100.0))));
        provider.push(&price_req(), Ok(MarketSnapshot::Price(price("BTCUSDT", 101.0))));

        let (dashboard, mut events) = Dashboard::start(provider, &settings());

        let up = next_matching(&mut events, |e| matches!(e, DashboardEvent::Flash(_))).await;
        assert_eq!(
            up,
            DashboardEvent::Flash(TickSignal {
                symbol: "BTCUSDT".into(),
                direction: Direction::Up
            })
        );
        let neutral = next_matching(&mut events, |e| matches!(e, DashboardEvent::Flash(_))).await;
        assert!(matches!(
            neutral,
            DashboardEvent::Flash(TickSignal { direction: Direction::Neutral, .. })
        ));
        dashboard.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_keeps_stale_data_but_reports_error() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push(&ticker_req(), Ok(MarketSnapshot::Ticker(ticker("BTCUSDT", 1.0))));
        provider.push(&price_req(), Ok(MarketSnapshot::Price(price("BTCUSDT", 100.0))));
        // later requests hit the exhausted script and fail

        let (dashboard, mut events) = Dashboard::start(provider, &settings());
        next_matching(&mut events, |e| {
            matches!(e, DashboardEvent::Monitor(MonitorState::Ready(_)))
        })
        .await;
        assert!(matches!(dashboard.monitor(), MonitorState::Ready(_)));

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(matches!(dashboard.monitor(), MonitorState::Failed(_)));
        assert!(dashboard.price.view().value.is_some());
        dashboard.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_event_stream() {
        let provider = Arc::new(ScriptedProvider::new());
        let (dashboard, mut events) = Dashboard::start(provider.clone(), &settings());
        tokio::time::sleep(Duration::from_millis(10)).await;
        dashboard.shutdown();

        let calls = provider.call_count();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(provider.call_count(), calls);
        while events.recv().await.is_some() {}
    }
}
