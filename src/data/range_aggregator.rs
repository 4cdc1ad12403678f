/// Historical range aggregation: windowed retrieval merged into one series
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Asia::Seoul;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, Instrument};

use crate::config::HistoryConfig;
use crate::data::windows::{plan_minute_windows, plan_period_windows, WindowFetcher, WindowRequest};
use crate::error::{KisError, Result};
use crate::types::{Candle, Environment, Timeframe};
use crate::utils::{kst_to_utc, now_kst, SessionHours};

/// Knobs for one aggregator
#[derive(Debug, Clone)]
pub struct RangeOptions {
    /// Calendar days per window for daily candles
    pub daily_window_days: i64,
    pub minute_window_minutes: i64,
    /// Pause between consecutive windows
    pub request_delay: Duration,
    pub session: SessionHours,
}

impl RangeOptions {
    pub fn from_config(history: &HistoryConfig, environment: Environment) -> Self {
        RangeOptions {
            daily_window_days: history.daily_window_days,
            minute_window_minutes: history.minute_window_minutes,
            request_delay: history.request_delay(environment),
            session: SessionHours::krx(),
        }
    }
}

impl Default for RangeOptions {
    fn default() -> Self {
        RangeOptions::from_config(&HistoryConfig::default(), Environment::Paper)
    }
}

/// Cooperative cancellation, checked before every window
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Keyed merge of candles; one entry per bucket, last insert wins
#[derive(Debug, Default)]
pub struct CandleAccumulator {
    buckets: BTreeMap<DateTime<Utc>, Candle>,
}

impl CandleAccumulator {
    pub fn new() -> Self {
        CandleAccumulator::default()
    }

    /// Returns true if an existing bucket was overwritten
    pub fn insert(&mut self, candle: Candle) -> bool {
        self.buckets.insert(candle.timestamp, candle).is_some()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Ascending by bucket
    pub fn into_sorted(self) -> Vec<Candle> {
        self.buckets.into_values().collect()
    }
}

/// Walks a long range newest-first through a [`WindowFetcher`] and stitches
/// the windows into one ascending, de-duplicated series.
pub struct RangeAggregator<F> {
    fetcher: F,
    options: RangeOptions,
}

impl<F: WindowFetcher> RangeAggregator<F> {
    pub fn new(fetcher: F, options: RangeOptions) -> Self {
        RangeAggregator { fetcher, options }
    }

    pub fn options(&self) -> &RangeOptions {
        &self.options
    }

    /// Daily (or weekly/monthly/yearly) candles for `[start, end]`.
    ///
    /// `end` defaults to today (KST). Any window failure aborts the pass and
    /// discards what was already collected.
    pub async fn fetch_ohlcv_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: NaiveDate,
        end: Option<NaiveDate>,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<Candle>> {
        let end = end.unwrap_or_else(|| now_kst().date_naive());
        if start > end {
            return Err(KisError::InvalidParameter(format!(
                "start {} is after end {}",
                start, end
            )));
        }

        let window_days = self.options.daily_window_days * timeframe.trading_days();
        let windows = plan_period_windows(symbol, timeframe, start, end, window_days);

        let lower = kst_to_utc(start.and_time(NaiveTime::MIN));
        let upper = kst_to_utc(end.and_time(NaiveTime::MIN));

        self.run_pass(symbol, windows, lower, upper, cancel).await
    }

    /// 1-minute candles for `[start, end]`, thinned to `interval` minutes.
    ///
    /// Only buckets whose minute-of-hour is a multiple of `interval` are kept.
    pub async fn fetch_minute_ohlcv_range(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
        interval: u32,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<Candle>> {
        if !(1..=60).contains(&interval) {
            return Err(KisError::InvalidParameter(format!(
                "interval must be 1..=60 minutes, got {}",
                interval
            )));
        }

        let end = end.unwrap_or_else(|| now_kst().naive_local());
        if start > end {
            return Err(KisError::InvalidParameter(format!(
                "start {} is after end {}",
                start, end
            )));
        }

        let windows = plan_minute_windows(
            symbol,
            start,
            end,
            self.options.minute_window_minutes,
            self.options.session,
        );

        let candles = self
            .run_pass(symbol, windows, kst_to_utc(start), kst_to_utc(end), cancel)
            .await?;

        Ok(candles
            .into_iter()
            .filter(|c| c.timestamp.with_timezone(&Seoul).minute() % interval == 0)
            .collect())
    }

    async fn run_pass(
        &self,
        symbol: &str,
        windows: Vec<WindowRequest>,
        lower: DateTime<Utc>,
        upper: DateTime<Utc>,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<Candle>> {
        let pass_id = uuid::Uuid::new_v4();
        let span = info_span!("range_pass", %pass_id, symbol, windows = windows.len());

        async move {
            let total = windows.len();
            let mut accumulator = CandleAccumulator::new();

            for (idx, window) in windows.iter().enumerate() {
                if cancel.map(CancelToken::is_cancelled).unwrap_or(false) {
                    info!("Range pass cancelled after {}/{} windows", idx, total);
                    return Err(KisError::Cancelled(format!(
                        "range pass for {} cancelled after {} of {} windows",
                        symbol, idx, total
                    )));
                }

                if idx > 0 && !self.options.request_delay.is_zero() {
                    tokio::time::sleep(self.options.request_delay).await;
                }

                let items = self.fetcher.fetch_window(window).await?;
                let fetched = items.len();

                let mut kept = 0;
                for candle in items {
                    if candle.timestamp >= lower && candle.timestamp <= upper {
                        accumulator.insert(candle);
                        kept += 1;
                    }
                }

                debug!(
                    "Window {}/{} [{} .. {}]: {} fetched, {} in range",
                    idx + 1,
                    total,
                    window.window_start,
                    window.window_end,
                    fetched,
                    kept
                );
            }

            info!("Range pass complete: {} candles from {} windows", accumulator.len(), total);
            Ok(accumulator.into_sorted())
        }
        .instrument(span)
        .await
    }
}
