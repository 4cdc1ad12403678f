pub mod export;
pub mod range_aggregator;
pub mod windows;

pub use export::{write_candles_csv, write_candles_csv_file};
pub use range_aggregator::{CancelToken, CandleAccumulator, RangeAggregator, RangeOptions};
pub use windows::{Granularity, WindowFetcher, WindowRequest};
