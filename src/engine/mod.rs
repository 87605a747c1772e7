// Derived-statistics engine: basket ranking, tick flashes, monitor panel
pub mod basket;  // market weight + turnover over the fixed universe
pub mod monitor; // single-symbol panel stats
pub mod tick;    // price direction classifier with decay
pub mod types;

pub use types::*;
