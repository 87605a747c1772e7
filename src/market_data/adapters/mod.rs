// Shared trait + request/response shapes for market data providers

use crate::market_data::types::{FetchError, PriceSample, TickerSnapshot};

/// What to ask the provider for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketRequest {
    /// Latest traded price of one symbol.
    Price { symbol: String },
    /// 24h statistics of one symbol.
    Ticker24h { symbol: String },
    /// 24h statistics of every traded symbol.
    AllTickers,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarketSnapshot {
    Price(PriceSample),
    Ticker(TickerSnapshot),
    Tickers(Vec<TickerSnapshot>),
}

impl MarketSnapshot {
    fn kind(&self) -> &'static str {
        match self {
            MarketSnapshot::Price(_) => "price",
            MarketSnapshot::Ticker(_) => "24h ticker",
            MarketSnapshot::Tickers(_) => "market tickers",
        }
    }
}

fn mismatch(what: &'static str, got: &MarketSnapshot) -> FetchError {
    FetchError::Decode {
        what,
        message: format!("provider answered with {}", got.kind()),
    }
}

#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch(&self, request: MarketRequest) -> Result<MarketSnapshot, FetchError>;

    async fn price(&self, symbol: &str) -> Result<PriceSample, FetchError> {
        match self.fetch(MarketRequest::Price { symbol: symbol.to_string() }).await? {
            MarketSnapshot::Price(p) => Ok(p),
            other => Err(mismatch("price", &other)),
        }
    }

    async fn ticker_24h(&self, symbol: &str) -> Result<TickerSnapshot, FetchError> {
        match self.fetch(MarketRequest::Ticker24h { symbol: symbol.to_string() }).await? {
            MarketSnapshot::Ticker(t) => Ok(t),
            other => Err(mismatch("24h ticker", &other)),
        }
    }

    async fn all_tickers(&self) -> Result<Vec<TickerSnapshot>, FetchError> {
        match self.fetch(MarketRequest::AllTickers).await? {
            MarketSnapshot::Tickers(ts) => Ok(ts),
            other => Err(mismatch("market tickers", &other)),
        }
    }
}

pub mod binance;
pub mod binance_types;

#[cfg(test)]
pub(crate) mod scripted;
