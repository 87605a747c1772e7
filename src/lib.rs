pub mod config;
pub mod engine;
pub mod market_data;
pub mod scheduler;
pub mod telemetry;

pub use config::Settings;
pub use market_data::router::{Dashboard, DashboardEvent};
pub use scheduler::PollingScheduler;
