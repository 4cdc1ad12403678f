/// Print realtime trades for one or more symbols until Ctrl-C
/// Usage: cargo run --bin watch_ticker -- <symbol> [symbol...]
use anyhow::{bail, Context};
use chrono_tz::Asia::Seoul;
use futures_util::stream::{self, StreamExt};
use kis_client::KisClient;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let symbols: Vec<String> = std::env::args().skip(1).collect();
    if symbols.is_empty() {
        bail!("usage: watch_ticker <symbol> [symbol...]");
    }

    let client = KisClient::from_env().context("failed to build client from KIS_* environment")?;

    let mut streams = Vec::with_capacity(symbols.len());
    for symbol in &symbols {
        streams.push(client.watch_ticker(symbol).await?);
    }
    let mut ticks = stream::select_all(streams);

    info!("🚀 Watching {} symbol(s), Ctrl-C to stop", symbols.len());

    loop {
        tokio::select! {
            tick = ticks.next() => match tick {
                Some(tick) => println!(
                    "{} {} {:>10.0} {:>+8.0} ({:+.2}%) vol {}",
                    tick.timestamp.with_timezone(&Seoul).format("%H:%M:%S"),
                    tick.symbol,
                    tick.price,
                    tick.change,
                    tick.change_percent,
                    tick.volume
                ),
                None => {
                    warn!("⚠️  Feed ended");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Stopping");
                break;
            }
        }
    }

    client.close().await?;
    Ok(())
}
