//! Basket ranking: market weight and turnover rate over a fixed universe.
//!
//! Everything here is a pure function of its input. Any division or parse
//! that could yield NaN/inf is guarded locally and degrades to 0.

use ahash::AHashSet;
use tracing::{instrument, trace};

use crate::engine::types::DerivedTicker;
use crate::market_data::normaliser::finite_or;
use crate::market_data::types::TickerSnapshot;

/// Top 20 USDT-margined perpetuals tracked by the basket view.
pub const TOP_SYMBOLS: [&str; 20] = [
    "BTCUSDT", "ETHUSDT", "BNBUSDT", "SOLUSDT", "XRPUSDT",
    "DOGEUSDT", "ADAUSDT", "AVAXUSDT", "SHIBUSDT", "DOTUSDT",
    "MATICUSDT", "LINKUSDT", "TRXUSDT", "BCHUSDT", "UNIUSDT",
    "ATOMUSDT", "ETCUSDT", "LTCUSDT", "NEARUSDT", "APTUSDT",
];

/// Primary turnover figures above this are treated as implausible.
pub const TURNOVER_CEILING: f64 = 1000.0;

/// Fixed set of symbols the basket is filtered to.
#[derive(Debug, Clone)]
pub struct Universe {
    symbols: Vec<String>,
    members: AHashSet<String>,
}

impl Universe {
    /// Duplicates are dropped, first occurrence wins.
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut members = AHashSet::new();
        let mut ordered = Vec::new();
        for symbol in symbols {
            let symbol = symbol.into();
            if members.insert(symbol.clone()) {
                ordered.push(symbol);
            }
        }
        Self { symbols: ordered, members }
    }

    pub fn top20() -> Self {
        Self::new(TOP_SYMBOLS)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.members.contains(symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }
}

impl Default for Universe {
    fn default() -> Self {
        Self::top20()
    }
}

// Sort key only. A malformed or negative figure ranks as no volume so the
// comparator stays a total order; weighting uses the raw figure.
fn ranking_volume(t: &TickerSnapshot) -> f64 {
    let qv = finite_or(t.quote_volume, 0.0);
    if qv > 0.0 {
        qv
    } else {
        0.0
    }
}

pub fn market_weight(quote_volume: f64, total: f64) -> f64 {
    let weight = if total > 0.0 {
        quote_volume / total * 100.0
    } else {
        0.0
    };
    finite_or(weight, 0.0)
}

/// Two-tier turnover estimate.
///
/// Primary: `quoteVolume / (weightedAvgPrice * volume) * 100`. When that is
/// non-finite, negative or above [`TURNOVER_CEILING`], the last traded price
/// replaces the weighted average. The result is always finite and >= 0.
pub fn turnover_rate(t: &TickerSnapshot) -> f64 {
    let qv = t.quote_volume;
    let volume = t.volume;

    let mut rate = 0.0;
    if t.weighted_avg_price > 0.0 && volume > 0.0 {
        rate = qv / (t.weighted_avg_price * volume) * 100.0;

        if !rate.is_finite() || rate < 0.0 || rate > TURNOVER_CEILING {
            rate = if t.last_price > 0.0 {
                qv / (t.last_price * volume) * 100.0
            } else {
                0.0
            };
        }
    }

    if rate.is_finite() && rate >= 0.0 {
        rate
    } else {
        0.0
    }
}

/// Filter `raw` to `universe`, rank by quote volume (descending, stable),
/// cap at the universe size and attach weight and turnover.
#[instrument(level = "debug", skip_all, fields(raw = raw.len(), universe = universe.len()))]
pub fn compute_basket_metrics(raw: &[TickerSnapshot], universe: &Universe) -> Vec<DerivedTicker> {
    let mut ranked: Vec<&TickerSnapshot> = raw
        .iter()
        .filter(|t| universe.contains(&t.symbol))
        .collect();

    // sort_by is stable: equal volumes keep their input order
    ranked.sort_by(|a, b| ranking_volume(b).total_cmp(&ranking_volume(a)));
    ranked.truncate(universe.len());

    // a NaN anywhere makes the total NaN, which zeroes every weight
    let total: f64 = ranked.iter().map(|t| t.quote_volume).sum();
    trace!(members = ranked.len(), total, "ranked basket");

    ranked
        .into_iter()
        .map(|t| DerivedTicker {
            market_weight: market_weight(t.quote_volume, total),
            turnover_rate: turnover_rate(t),
            ticker: t.clone(),
        })
        .collect()
}
