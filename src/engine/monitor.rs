//! Single-symbol monitor panel: 24h statistics joined with the live price.

use serde::Serialize;

use crate::market_data::normaliser::finite_or;
use crate::market_data::types::{FetchError, PriceSample, TickerSnapshot};
use crate::scheduler::FeedView;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStats {
    pub symbol: String,
    pub current_price: f64,
    pub price_change: f64,
    pub price_change_percent: f64,
    /// 24h change is zero or positive.
    pub is_positive: bool,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub weighted_avg_price: f64,
    pub volume: f64,
    pub quote_volume: f64,
    /// Signed move of the live price against the 24h open, in percent.
    pub change_from_open_pct: f64,
    /// Where the live price sits inside the 24h low..high range, 0..=100.
    pub range_position_pct: f64,
}

impl MonitorStats {
    pub fn compute(ticker: &TickerSnapshot, price: &PriceSample) -> Self {
        let current = price.price;
        let open = ticker.open_price;
        let (low, high) = (ticker.low_price, ticker.high_price);

        let change_from_open_pct = finite_or((current - open) / open * 100.0, 0.0);
        let range_position_pct = finite_or((current - low) / (high - low) * 100.0, 0.0).clamp(0.0, 100.0);

        Self {
            symbol: ticker.symbol.clone(),
            current_price: current,
            price_change: ticker.price_change,
            price_change_percent: ticker.price_change_percent,
            is_positive: ticker.price_change >= 0.0,
            open_price: open,
            high_price: high,
            low_price: low,
            weighted_avg_price: ticker.weighted_avg_price,
            volume: ticker.volume,
            quote_volume: ticker.quote_volume,
            change_from_open_pct,
            range_position_pct,
        }
    }

    pub fn is_above_open(&self) -> bool {
        self.current_price >= self.open_price
    }
}

/// Combined state of the two feeds the monitor panel depends on.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorState {
    Loading,
    Failed(FetchError),
    Ready(MonitorStats),
}

/// An error on either feed wins (the 24h ticker first), then missing data
/// on either feed means loading.
pub fn combine_views(ticker: &FeedView<TickerSnapshot>, price: &FeedView<PriceSample>) -> MonitorState {
    if let Some(err) = ticker.error.as_ref().or(price.error.as_ref()) {
        return MonitorState::Failed(err.clone());
    }
    match (ticker.value.as_deref(), price.value.as_deref()) {
        (Some(t), Some(p)) => MonitorState::Ready(MonitorStats::compute(t, p)),
        _ => MonitorState::Loading,
    }
}
