// Market data module entrypoint
pub mod adapters;   // provider trait + Binance USDⓈ-M futures REST client
pub mod normaliser; // decimal strings -> f64, NaN on garbage
pub mod router;     // wires feeds to the engines for the dashboard
pub mod types;      // wire snapshots + fetch errors
