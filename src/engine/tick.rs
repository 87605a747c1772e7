//! Price tick classifier.
//!
//! Compares consecutive price samples per symbol and raises a short-lived
//! up/down flash that decays back to neutral on its own timer.

use std::time::Duration;

use ahash::AHashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

use crate::engine::types::{Direction, PriceTickState};
use crate::market_data::types::PriceSample;

pub const FLASH_DURATION: Duration = Duration::from_millis(500);

/// Keyed state table: symbol -> PriceTickState.
#[derive(Debug)]
pub struct PriceTickClassifier {
    states: AHashMap<String, PriceTickState>,
    flash: Duration,
}

impl Default for PriceTickClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceTickClassifier {
    pub fn new() -> Self {
        Self::with_flash_duration(FLASH_DURATION)
    }

    pub fn with_flash_duration(flash: Duration) -> Self {
        Self {
            states: AHashMap::new(),
            flash,
        }
    }

    /// Feed one price. Returns the direction raised by this sample, if any.
    ///
    /// The first sample of a symbol only records the reference price. Equal
    /// prices leave the direction and any pending deadline untouched, but the
    /// reference always advances. Non-finite prices are ignored entirely.
    pub fn observe(&mut self, symbol: &str, price: f64, now: Instant) -> Option<Direction> {
        if !price.is_finite() {
            debug!(symbol, "ignoring unparsable price sample");
            return None;
        }

        let Some(state) = self.states.get_mut(symbol) else {
            self.states.insert(
                symbol.to_string(),
                PriceTickState {
                    last_price: Some(price),
                    ..Default::default()
                },
            );
            return None;
        };

        let raised = match state.last_price {
            Some(prev) if price > prev => Some(Direction::Up),
            Some(prev) if price < prev => Some(Direction::Down),
            _ => None,
        };
        state.last_price = Some(price);

        if let Some(direction) = raised {
            state.direction = direction;
            state.decay_deadline = Some(now + self.flash);
            trace!(symbol, price, ?direction, "price tick");
        }
        raised
    }

    pub fn observe_sample(&mut self, sample: &PriceSample, now: Instant) -> Option<Direction> {
        self.observe(&sample.symbol, sample.price, now)
    }

    pub fn direction(&self, symbol: &str, now: Instant) -> Direction {
        self.states
            .get(symbol)
            .map_or(Direction::Neutral, |s| s.direction_at(now))
    }

    pub fn state(&self, symbol: &str) -> Option<&PriceTickState> {
        self.states.get(symbol)
    }

    /// Earliest pending decay deadline across all symbols.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.states.values().filter_map(|s| s.decay_deadline).min()
    }

    /// Settle every flash whose deadline has passed; returns the symbols that
    /// went back to neutral.
    pub fn expire(&mut self, now: Instant) -> Vec<String> {
        let mut decayed = Vec::new();
        for (symbol, state) in self.states.iter_mut() {
            if matches!(state.decay_deadline, Some(deadline) if deadline <= now) {
                state.direction = Direction::Neutral;
                state.decay_deadline = None;
                decayed.push(symbol.clone());
            }
        }
        decayed
    }
}

/// Direction change pushed to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct TickSignal {
    pub symbol: String,
    pub direction: Direction,
}

/// Drive a classifier from a stream of samples.
///
/// A single `sleep_until` on the nearest deadline acts as the decay timer;
/// it is rebuilt on every loop turn, so a newer tick replaces the pending
/// decay instead of racing it. Signals are sent without waiting; when the
/// buffer is full the flash is dropped. The task ends (and its timer with
/// it) when the sample sender or the signal receiver is dropped.
pub fn spawn_classifier(
    mut samples: mpsc::Receiver<PriceSample>,
    signals: mpsc::Sender<TickSignal>,
    flash: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut classifier = PriceTickClassifier::with_flash_duration(flash);
        loop {
            let deadline = classifier.next_deadline();
            let wake = deadline.unwrap_or_else(Instant::now);

            let out: Vec<TickSignal> = tokio::select! {
                sample = samples.recv() => match sample {
                    Some(sample) => classifier
                        .observe_sample(&sample, Instant::now())
                        .map(|direction| TickSignal { symbol: sample.symbol, direction })
                        .into_iter()
                        .collect(),
                    None => break,
                },
                _ = sleep_until(wake), if deadline.is_some() => classifier
                    .expire(Instant::now())
                    .into_iter()
                    .map(|symbol| TickSignal { symbol, direction: Direction::Neutral })
                    .collect(),
            };

            // never wait on the consumer: it may itself be blocked feeding us
            for signal in out {
                match signals.try_send(signal) {
                    Ok(()) => {}
                    Err(TrySendError::Full(signal)) => {
                        trace!(symbol = %signal.symbol, direction = ?signal.direction, "signal buffer full, dropping flash");
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!("tick signal receiver dropped, stopping classifier");
                        return;
                    }
                }
            }
        }
        debug!("price sample stream closed, stopping classifier");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::types::fixtures::price;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_first_sample_only_records_reference() {
        let mut c = PriceTickClassifier::new();
        let t0 = Instant::now();
        assert_eq!(c.observe("BTCUSDT", 100.0, t0), None);
        let state = c.state("BTCUSDT").unwrap();
        assert_eq!(state.last_price, Some(100.0));
        assert_eq!(state.direction, Direction::Neutral);
        assert_eq!(state.decay_deadline, None);
    }

    #[test]
    fn test_up_tick_decays_after_flash() {
        let mut c = PriceTickClassifier::new();
        let t0 = Instant::now();
        c.observe("BTCUSDT", 100.0, t0);
        assert_eq!(c.observe("BTCUSDT", 101.0, t0), Some(Direction::Up));

        assert_eq!(c.direction("BTCUSDT", t0), Direction::Up);
        assert_eq!(c.direction("BTCUSDT", t0 + 499 * MS), Direction::Up);
        assert_eq!(c.direction("BTCUSDT", t0 + 500 * MS), Direction::Neutral);
        assert_eq!(c.direction("BTCUSDT", t0 + 5_000 * MS), Direction::Neutral);
    }

    #[test]
    fn test_equal_price_advances_reference_without_transition() {
        let mut c = PriceTickClassifier::new();
        let t0 = Instant::now();
        c.observe("ETHUSDT", 100.0, t0);
        assert_eq!(c.observe("ETHUSDT", 100.0, t0 + 1_000 * MS), None);
        assert_eq!(c.direction("ETHUSDT", t0 + 1_000 * MS), Direction::Neutral);
        assert_eq!(c.state("ETHUSDT").unwrap().last_price, Some(100.0));

        assert_eq!(c.observe("ETHUSDT", 99.0, t0 + 2_000 * MS), Some(Direction::Down));
        assert_eq!(c.direction("ETHUSDT", t0 + 2_000 * MS), Direction::Down);
    }

    #[test]
    fn test_equal_price_keeps_pending_deadline() {
        let mut c = PriceTickClassifier::new();
        let t0 = Instant::now();
        c.observe("BTCUSDT", 100.0, t0);
        c.observe("BTCUSDT", 101.0, t0);
        c.observe("BTCUSDT", 101.0, t0 + 300 * MS);
        assert_eq!(c.state("BTCUSDT").unwrap().decay_deadline, Some(t0 + 500 * MS));
        assert_eq!(c.direction("BTCUSDT", t0 + 400 * MS), Direction::Up);
    }

    #[test]
    fn test_newer_tick_replaces_deadline() {
        let mut c = PriceTickClassifier::new();
        let t0 = Instant::now();
        c.observe("BTCUSDT", 100.0, t0);
        c.observe("BTCUSDT", 101.0, t0);
        assert_eq!(c.observe("BTCUSDT", 100.5, t0 + 400 * MS), Some(Direction::Down));
        assert_eq!(c.direction("BTCUSDT", t0 + 600 * MS), Direction::Down);
        assert_eq!(c.direction("BTCUSDT", t0 + 900 * MS), Direction::Neutral);
    }

    #[test]
    fn test_unparsable_price_is_ignored() {
        let mut c = PriceTickClassifier::new();
        let t0 = Instant::now();
        c.observe("BTCUSDT", 100.0, t0);
        assert_eq!(c.observe("BTCUSDT", f64::NAN, t0), None);
        assert_eq!(c.state("BTCUSDT").unwrap().last_price, Some(100.0));
        assert_eq!(c.observe("BTCUSDT", 99.0, t0), Some(Direction::Down));

        assert_eq!(c.observe("SOLUSDT", f64::NAN, t0), None);
        assert!(c.state("SOLUSDT").is_none());
    }

    #[test]
    fn test_symbols_are_independent() {
        let mut c = PriceTickClassifier::new();
        let t0 = Instant::now();
        c.observe("BTCUSDT", 100.0, t0);
        c.observe("ETHUSDT", 10.0, t0);
        c.observe("BTCUSDT", 101.0, t0);
        assert_eq!(c.direction("BTCUSDT", t0), Direction::Up);
        assert_eq!(c.direction("ETHUSDT", t0), Direction::Neutral);
    }

    #[test]
    fn test_expire() {
        let mut c = PriceTickClassifier::new();
        let t0 = Instant::now();
        c.observe("BTCUSDT", 100.0, t0);
        c.observe("BTCUSDT", 101.0, t0);
        assert_eq!(c.next_deadline(), Some(t0 + 500 * MS));
        assert!(c.expire(t0 + 499 * MS).is_empty());
        assert_eq!(c.expire(t0 + 500 * MS), vec!["BTCUSDT".to_string()]);
        assert_eq!(c.next_deadline(), None);
        assert_eq!(c.state("BTCUSDT").unwrap().direction, Direction::Neutral);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_emits_flash_then_decay() {
        let (sample_tx, sample_rx) = mpsc::channel(8);
        let (signal_tx, mut signal_rx) = mpsc::channel(8);
        let task = spawn_classifier(sample_rx, signal_tx, FLASH_DURATION);

        sample_tx.send(price("BTCUSDT", 100.0)).await.unwrap();
        sample_tx.send(price("BTCUSDT", 101.0)).await.unwrap();

        let start = Instant::now();
        let up = signal_rx.recv().await.unwrap();
        assert_eq!(up.direction, Direction::Up);

        let neutral = signal_rx.recv().await.unwrap();
        assert_eq!(neutral.direction, Direction::Neutral);
        assert!(start.elapsed() >= FLASH_DURATION);

        drop(sample_tx);
        task.await.unwrap();
        assert!(signal_rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_newer_tick_extends_flash() {
        let (sample_tx, sample_rx) = mpsc::channel(8);
        let (signal_tx, mut signal_rx) = mpsc::channel(8);
        let _task = spawn_classifier(sample_rx, signal_tx, FLASH_DURATION);

        sample_tx.send(price("BTCUSDT", 100.0)).await.unwrap();
        sample_tx.send(price("BTCUSDT", 101.0)).await.unwrap();
        assert_eq!(signal_rx.recv().await.unwrap().direction, Direction::Up);
        let first = Instant::now();

        tokio::time::sleep(Duration::from_millis(300)).await;
        sample_tx.send(price("BTCUSDT", 102.0)).await.unwrap();
        assert_eq!(signal_rx.recv().await.unwrap().direction, Direction::Up);

        assert_eq!(signal_rx.recv().await.unwrap().direction, Direction::Neutral);
        assert!(first.elapsed() >= Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_keeps_consuming_when_signals_back_up() {
        let (sample_tx, sample_rx) = mpsc::channel(1);
        let (signal_tx, mut signal_rx) = mpsc::channel(1);
        let task = spawn_classifier(sample_rx, signal_tx, FLASH_DURATION);

        // nobody drains signals: every sample must still be accepted
        let feed = async {
            for i in 0..20 {
                sample_tx.send(price("BTCUSDT", 100.0 + i as f64)).await.unwrap();
            }
        };
        tokio::time::timeout(Duration::from_millis(100), feed)
            .await
            .expect("classifier stopped accepting samples");

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!task.is_finished());

        // one buffered flash survived, the rest were dropped
        assert_eq!(signal_rx.recv().await.unwrap().direction, Direction::Up);
        assert!(signal_rx.try_recv().is_err());

        drop(sample_tx);
        task.await.unwrap();
    }
}
