//! Runtime settings.
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! TOML file, then `PULSE_*` environment variables (nested keys use `__`,
//! e.g. `PULSE_MONITOR__SYMBOL=ETHUSDT`, lists are comma separated).

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::engine::basket::{Universe, TOP_SYMBOLS};
use crate::market_data::adapters::binance_types::DEFAULT_BASE_URL;

pub const DEFAULT_CONFIG_FILE: &str = "pulse.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub symbol: String,
    pub price_interval_ms: u64,
    pub ticker_interval_ms: u64,
    pub flash_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            price_interval_ms: 1_000,
            ticker_interval_ms: 2_000,
            flash_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BasketSettings {
    pub interval_ms: u64,
    pub symbols: Vec<String>,
}

impl Default for BasketSettings {
    fn default() -> Self {
        Self {
            interval_ms: 3_000,
            symbols: TOP_SYMBOLS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub provider: ProviderSettings,
    pub monitor: MonitorSettings,
    pub basket: BasketSettings,
    /// Minimum data age before a focus event triggers a refetch.
    pub revalidate_after_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ProviderSettings::default(),
            monitor: MonitorSettings::default(),
            basket: BasketSettings::default(),
            revalidate_after_ms: 2_000,
        }
    }
}

impl Settings {
    /// Load from `path` (or `pulse.toml` in the working directory if it
    /// exists) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("PULSE")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("basket.symbols")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("monitor.price_interval_ms", self.monitor.price_interval_ms),
            ("monitor.ticker_interval_ms", self.monitor.ticker_interval_ms),
            ("basket.interval_ms", self.basket.interval_ms),
            ("provider.request_timeout_ms", self.provider.request_timeout_ms),
        ];
        for (key, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.basket.symbols.is_empty() {
            return Err(ConfigError::Invalid {
                key: "basket.symbols",
                reason: "universe must contain at least one symbol".to_string(),
            });
        }
        if self.monitor.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "monitor.symbol",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn universe(&self) -> Universe {
        Universe::new(self.basket.symbols.iter().map(|s| s.trim().to_uppercase()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.provider.request_timeout_ms)
    }

    pub fn price_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.price_interval_ms)
    }

    pub fn ticker_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.ticker_interval_ms)
    }

    pub fn basket_interval(&self) -> Duration {
        Duration::from_millis(self.basket.interval_ms)
    }

    pub fn flash_duration(&self) -> Duration {
        Duration::from_millis(self.monitor.flash_ms)
    }

    pub fn revalidate_after(&self) -> Duration {
        Duration::from_millis(self.revalidate_after_ms)
    }
}
