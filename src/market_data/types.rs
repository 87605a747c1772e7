use serde::{Deserialize, Serialize};

use crate::market_data::normaliser::{de_decimal, nan};

/// Failure of a single provider request.
///
/// Numeric fields that fail to parse are not errors (see `normaliser`);
/// only transport failures and bodies that are not the expected JSON shape
/// surface here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The provider answered with a non-success status.
    #[error("failed to fetch {what}: HTTP {status}{message}")]
    Transport {
        what: &'static str,
        status: u16,
        message: String,
    },
    /// The request never produced a response (DNS, TLS, timeout...).
    #[error("failed to fetch {what}: {message}")]
    Request { what: &'static str, message: String },
    /// The body was not the expected JSON document.
    #[error("malformed {what} payload: {message}")]
    Decode { what: &'static str, message: String },
}

impl FetchError {
    pub fn what(&self) -> &'static str {
        match self {
            FetchError::Transport { what, .. }
            | FetchError::Request { what, .. }
            | FetchError::Decode { what, .. } => what,
        }
    }
}

/// 24h rolling-window statistics for one instrument.
///
/// Decimal fields arrive as text and are parsed to `f64`; malformed text
/// becomes NaN. `last_qty`, `first_id` and `last_id` are only sent by the
/// single-symbol endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerSnapshot {
    pub symbol: String,
    #[serde(deserialize_with = "de_decimal")]
    pub price_change: f64,
    #[serde(deserialize_with = "de_decimal")]
    pub price_change_percent: f64,
    #[serde(deserialize_with = "de_decimal")]
    pub weighted_avg_price: f64,
    #[serde(deserialize_with = "de_decimal")]
    pub last_price: f64,
    #[serde(default = "nan", deserialize_with = "de_decimal")]
    pub last_qty: f64,
    #[serde(deserialize_with = "de_decimal")]
    pub open_price: f64,
    #[serde(deserialize_with = "de_decimal")]
    pub high_price: f64,
    #[serde(deserialize_with = "de_decimal")]
    pub low_price: f64,
    #[serde(deserialize_with = "de_decimal")]
    pub volume: f64,
    #[serde(deserialize_with = "de_decimal")]
    pub quote_volume: f64,
    pub open_time: i64,
    pub close_time: i64,
    #[serde(default)]
    pub first_id: Option<i64>,
    #[serde(default)]
    pub last_id: Option<i64>,
    pub count: u64,
}

/// Latest traded price for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub symbol: String,
    #[serde(deserialize_with = "de_decimal")]
    pub price: f64,
    /// Server timestamp in milliseconds.
    #[serde(rename = "time", alias = "serverTime")]
    pub observed_at: u64,
}
