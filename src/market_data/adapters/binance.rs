// Binance USDⓈ-M futures REST adapter

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use super::binance_types::{ApiErrorBody, DEFAULT_BASE_URL, PRICE_PATH, TICKER_24H_PATH};
use super::{MarketDataProvider, MarketRequest, MarketSnapshot};
use crate::market_data::types::FetchError;

pub struct BinanceFuturesAdapter {
    client: reqwest::Client,
    base_url: String, // "https://fapi.binance.com/fapi/v1"
}

impl BinanceFuturesAdapter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| FetchError::Request {
                what: "http client",
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn with_default_endpoint(timeout: Duration) -> Result<Self, FetchError> {
        Self::new(DEFAULT_BASE_URL, timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        what: &'static str,
    ) -> Result<T, FetchError> {
        let url = format!("{}/{}", self.base_url, path);
        let res = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Request {
                what,
                message: e.to_string(),
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%url, status = status.as_u16(), "provider returned non-success status");
            return Err(FetchError::Transport {
                what,
                status: status.as_u16(),
                message: error_detail(status, &body),
            });
        }

        res.json::<T>().await.map_err(|e| FetchError::Decode {
            what,
            message: e.to_string(),
        })
    }
}

// Binance explains most rejections in a small JSON body; keep its `msg`
// so the consumer sees something better than a bare status code.
fn error_detail(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(err) => format!(" ({} {})", err.code, err.msg),
        Err(_) => match status.canonical_reason() {
            Some(reason) => format!(" ({})", reason),
            None => String::new(),
        },
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for BinanceFuturesAdapter {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, request: MarketRequest) -> Result<MarketSnapshot, FetchError> {
        let snapshot = match &request {
            MarketRequest::Price { symbol } => MarketSnapshot::Price(
                self.get_json(PRICE_PATH, &[("symbol", symbol.as_str())], "price")
                    .await?,
            ),
            MarketRequest::Ticker24h { symbol } => MarketSnapshot::Ticker(
                self.get_json(TICKER_24H_PATH, &[("symbol", symbol.as_str())], "24h ticker")
                    .await?,
            ),
            MarketRequest::AllTickers => MarketSnapshot::Tickers(
                self.get_json(TICKER_24H_PATH, &[], "market tickers").await?,
            ),
        };
        debug!("provider request completed");
        Ok(snapshot)
    }
}
