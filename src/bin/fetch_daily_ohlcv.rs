/// Export daily (or weekly/monthly/yearly) candles for a date range to CSV
/// Usage: cargo run --bin fetch_daily_ohlcv -- <symbol> <start YYYYMMDD> [end YYYYMMDD] [timeframe 1d|1w|1M|1y]
use anyhow::{bail, Context};
use kis_client::utils::parse_vendor_date;
use kis_client::{KisClient, Timeframe};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

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
        bail!("usage: fetch_daily_ohlcv <symbol> <start YYYYMMDD> [end YYYYMMDD] [1d|1w|1M|1y]");
    }

    let symbol = args[0].as_str();
    let start = parse_vendor_date(&args[1]).with_context(|| format!("bad start date {}", args[1]))?;
    let end = match args.get(2) {
        Some(s) => Some(parse_vendor_date(s).with_context(|| format!("bad end date {}", s))?),
        None => None,
    };
    let timeframe = match args.get(3) {
        Some(s) => Timeframe::from_str(s).with_context(|| format!("bad timeframe {}", s))?,
        None => Timeframe::Day,
    };

    info!("📈 {} {:?} candles from {} to {}", symbol, timeframe, start, end.map(|d| d.to_string()).unwrap_or_else(|| "today".to_string()));

    let client = KisClient::from_env().context("failed to build client from KIS_* environment")?;

    let candles = match client.fetch_ohlcv_range(symbol, timeframe, start, end).await {
        Ok(candles) => candles,
        Err(e) => {
            error!("❌ Range fetch failed [{}]: {}", e.error_code(), e);
            return Err(e.into());
        }
    };

    let path = format!("{}_{}_{}.csv", symbol, timeframe.period_code(), start.format("%Y%m%d"));
    kis_client::data::write_candles_csv_file(&path, &candles)?;

    match (candles.first(), candles.last()) {
        (Some(first), Some(last)) => info!(
            "✅ Wrote {} candles ({} .. {}) to {}",
            candles.len(),
            first.timestamp,
            last.timestamp,
            path
        ),
        _ => info!("⚠️  No candles in range; wrote header only to {}", path),
    }

    Ok(())
}
