/// Export minute candles for a time range to CSV
/// Usage: cargo run --bin fetch_minute_ohlcv -- <symbol> <start YYYYMMDDHHMM> [end YYYYMMDDHHMM] [interval minutes]
use anyhow::{bail, Context};
use chrono::NaiveDateTime;
use kis_client::KisClient;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn parse_minute(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y%m%d%H%M").with_context(|| format!("bad timestamp {} (want YYYYMMDDHHMM)", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        bail!("usage: fetch_minute_ohlcv <symbol> <start YYYYMMDDHHMM> [end YYYYMMDDHHMM] [interval]");
    }

    let symbol = args[0].as_str();
    let start = parse_minute(&args[1])?;
    let end = args.get(2).map(|s| parse_minute(s)).transpose()?;
    let interval: u32 = match args.get(3) {
        Some(s) => s.parse().with_context(|| format!("bad interval {}", s))?,
        None => 1,
    };

    info!("⏱️  {} {}-minute candles from {}", symbol, interval, start);

    let client = KisClient::from_env().context("failed to build client from KIS_* environment")?;

    let candles = match client.fetch_minute_ohlcv_range(symbol, start, end, interval).await {
        Ok(candles) => candles,
        Err(e) => {
            error!("❌ Minute range fetch failed [{}]: {}", e.error_code(), e);
            return Err(e.into());
        }
    };

    let path = format!("{}_{}m_{}.csv", symbol, interval, start.format("%Y%m%d%H%M"));
    kis_client::data::write_candles_csv_file(&path, &candles)?;

    info!("✅ Wrote {} candles to {}", candles.len(), path);
    Ok(())
}
