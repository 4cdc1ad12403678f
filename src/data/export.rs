/// CSV export for candle series
use chrono_tz::Asia::Seoul;
use std::io::Write;
use std::path::Path;

use crate::error::{KisError, Result};
use crate::types::Candle;

const HEADER: [&str; 7] = ["timestamp", "timestamp_ms", "open", "high", "low", "close", "volume"];

/// Write `candles` with a header row; timestamps are KST RFC 3339
pub fn write_candles_csv<W: Write>(writer: W, candles: &[Candle]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(HEADER).map_err(csv_error)?;

    for candle in candles {
        writer
            .write_record([
                candle.timestamp.with_timezone(&Seoul).to_rfc3339(),
                candle.timestamp_ms.to_string(),
                candle.open.to_string(),
                candle.high.to_string(),
                candle.low.to_string(),
                candle.close.to_string(),
                candle.volume.to_string(),
            ])
            .map_err(csv_error)?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_candles_csv_file<P: AsRef<Path>>(path: P, candles: &[Candle]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_candles_csv(file, candles)
}

fn csv_error(e: csv::Error) -> KisError {
    KisError::Io(e.into())
}
