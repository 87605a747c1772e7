use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use pulse_rs::config::Settings;
use pulse_rs::engine::monitor::{MonitorState, MonitorStats};
use pulse_rs::engine::tick::TickSignal;
use pulse_rs::engine::types::{DerivedTicker, Direction};
use pulse_rs::market_data::adapters::binance::BinanceFuturesAdapter;
use pulse_rs::market_data::router::{BasketState, Dashboard, DashboardEvent};
use pulse_rs::telemetry;

#[derive(Debug, Parser)]
#[command(name = "pulse", about = "Live crypto futures dashboard")]
struct Cli {
    /// Settings file (defaults to ./pulse.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Monitor this symbol instead of the configured one
    #[arg(long)]
    symbol: Option<String>,
    /// Tracing filter used when RUST_LOG is unset
    #[arg(long, default_value = "info,pulse_rs=debug")]
    log: String,
}

// Helper function to print the basket table
fn print_basket(basket: &[DerivedTicker]) {
    println!("\n=== Top {} by 24h quote volume ===", basket.len());
    println!("{:<8} {:>14} {:>9} {:>18} {:>9} {:>10}", "Asset", "Last", "24h %", "Quote vol", "Weight", "Turnover");
    for t in basket {
        println!(
            "{:<8} {:>14.4} {:>8.2}% {:>18.0} {:>8.2}% {:>10.2}",
            t.base_asset(),
            t.ticker.last_price,
            t.ticker.price_change_percent,
            t.ticker.quote_volume,
            t.market_weight,
            t.turnover_rate,
        );
    }
    println!("==================================\n");
}

// Helper function to print the monitor panel
fn print_monitor(stats: &MonitorStats) {
    let arrow = if stats.is_positive { "▲" } else { "▼" };
    println!(
        "{} {:.4} {} {:+.2}% | open {:.4} ({:+.2}%) | range {:.4}..{:.4} @ {:.0}%",
        stats.symbol,
        stats.current_price,
        arrow,
        stats.price_change_percent,
        stats.open_price,
        stats.change_from_open_pct,
        stats.low_price,
        stats.high_price,
        stats.range_position_pct,
    );
}

fn print_flash(signal: &TickSignal) {
    match signal.direction {
        Direction::Up => println!("  {} ↑", signal.symbol),
        Direction::Down => println!("  {} ↓", signal.symbol),
        Direction::Neutral => {}
    }
}

fn render(event: &DashboardEvent) {
    match event {
        DashboardEvent::Basket(BasketState::Ready(basket)) => print_basket(basket),
        DashboardEvent::Basket(BasketState::Failed(e)) => println!("❌ basket: {}", e),
        DashboardEvent::Basket(BasketState::Loading) => {}
        DashboardEvent::Monitor(MonitorState::Ready(stats)) => print_monitor(stats),
        DashboardEvent::Monitor(MonitorState::Failed(e)) => println!("❌ monitor: {}", e),
        DashboardEvent::Monitor(MonitorState::Loading) => {}
        DashboardEvent::Flash(signal) => print_flash(signal),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env

    let cli = Cli::parse();
    telemetry::init_tracing(&cli.log);
    telemetry::init_metrics();

    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    if let Some(symbol) = cli.symbol {
        settings.monitor.symbol = symbol.to_uppercase();
    }

    let provider = BinanceFuturesAdapter::new(&settings.provider.base_url, settings.request_timeout())
        .context("building Binance client")?;
    info!(base_url = provider.base_url(), "using Binance futures REST");

    let (dashboard, mut events) = Dashboard::start(Arc::new(provider), &settings);
    println!("Commands: r = refresh (focus regained), q = quit");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            Some(event) = events.recv() => render(&event),
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match line.trim() {
                    "r" | "refresh" => {
                        let issued = dashboard.focus_regained();
                        println!("Revalidating {} stale feed(s)", issued);
                    }
                    "q" | "quit" | "exit" => break,
                    "" => {}
                    other => println!("Unknown command '{}'", other),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "stdin closed");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
            else => break,
        }
    }

    dashboard.shutdown();
    println!("Goodbye!");
    Ok(())
}
