use serde::Serialize;
use tokio::time::Instant;

use crate::market_data::types::TickerSnapshot;

/// Quote asset every basket symbol is priced in.
pub const QUOTE_ASSET: &str = "USDT";

// Basket member with its derived statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedTicker {
    #[serde(flatten)]
    pub ticker: TickerSnapshot,
    /// Share of the basket's quote volume, in percent.
    pub market_weight: f64,
    /// Relative activity estimate, finite and >= 0.
    pub turnover_rate: f64,
}

impl DerivedTicker {
    pub fn symbol(&self) -> &str {
        &self.ticker.symbol
    }

    /// Symbol without the quote suffix, e.g. `BTC` for `BTCUSDT`.
    pub fn base_asset(&self) -> &str {
        self.ticker
            .symbol
            .strip_suffix(QUOTE_ASSET)
            .unwrap_or(&self.ticker.symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    #[default]
    Neutral,
}

impl Direction {
    pub fn is_flashing(&self) -> bool {
        !matches!(self, Direction::Neutral)
    }
}

/// Per-symbol classifier record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTickState {
    /// Reference price for the next comparison.
    pub last_price: Option<f64>,
    pub direction: Direction,
    pub decay_deadline: Option<Instant>,
}

impl PriceTickState {
    /// Direction as seen at `now`: a flash only holds until its deadline.
    pub fn direction_at(&self, now: Instant) -> Direction {
        match self.decay_deadline {
            Some(deadline) if now < deadline => self.direction,
            _ => Direction::Neutral,
        }
    }
}
