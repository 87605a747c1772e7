// Source: https://fapi.binance.com/fapi/v1 (USDⓈ-M futures market data)

pub const DEFAULT_BASE_URL: &str = "https://fapi.binance.com/fapi/v1";

pub const PRICE_PATH: &str = "ticker/price";
pub const TICKER_24H_PATH: &str = "ticker/24hr";

// Error body returned alongside non-2xx statuses, e.g.
// {"code":-1121,"msg":"Invalid symbol."}
#[derive(Debug, serde::Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}
