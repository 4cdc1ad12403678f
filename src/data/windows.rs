/// Window planning for chunked historical retrieval
use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime};
use std::future::Future;

use crate::error::Result;
use crate::types::{Candle, Timeframe};
use crate::utils::{is_trading_weekday, SessionHours};

/// Bucket size of a windowed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Period(Timeframe),
    /// 1-minute buckets, the only intraday size the vendor serves
    Minute,
}

/// One vendor call's worth of range; exchange-local (KST) bounds, inclusive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRequest {
    pub symbol: String,
    pub window_start: NaiveDateTime,
    pub window_end: NaiveDateTime,
    pub granularity: Granularity,
}

impl WindowRequest {
    pub fn start_date(&self) -> NaiveDate {
        self.window_start.date()
    }

    pub fn end_date(&self) -> NaiveDate {
        self.window_end.date()
    }
}

/// Source of candles for one window.
///
/// Implementations return whatever the vendor sent, in any order; range
/// filtering and de-duplication happen in the aggregator.
pub trait WindowFetcher {
    fn fetch_window(
        &self,
        request: &WindowRequest,
    ) -> impl Future<Output = Result<Vec<Candle>>> + Send;
}

/// First day of the bucket containing `date`
pub fn bucket_start(timeframe: Timeframe, date: NaiveDate) -> NaiveDate {
    match timeframe {
        Timeframe::Day => date,
        Timeframe::Week => date - Duration::days(date.weekday().num_days_from_monday() as i64),
        Timeframe::Month => date.with_day(1).unwrap_or(date),
        Timeframe::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
    }
}

/// First bucket boundary on or after `date`
fn next_bucket_start(timeframe: Timeframe, date: NaiveDate) -> NaiveDate {
    let start = bucket_start(timeframe, date);
    if start == date {
        return date;
    }
    let next = match timeframe {
        Timeframe::Day => Some(date),
        Timeframe::Week => start.checked_add_signed(Duration::days(7)),
        Timeframe::Month => start.checked_add_months(Months::new(1)),
        Timeframe::Year => NaiveDate::from_ymd_opt(start.year() + 1, 1, 1),
    };
    next.unwrap_or(start)
}

/// Daily-or-longer windows over `[start, end]`, newest first.
///
/// Windows tile the range exactly; each spans at most `window_days` calendar
/// days. Interior window edges fall on bucket boundaries (Monday, the 1st of
/// the month, Jan 1) so no weekly, monthly or yearly bucket is split across
/// two calls. A window narrower than one bucket is widened to that bucket.
pub fn plan_period_windows(
    symbol: &str,
    timeframe: Timeframe,
    start: NaiveDate,
    end: NaiveDate,
    window_days: i64,
) -> Vec<WindowRequest> {
    let mut windows = Vec::new();
    if start > end {
        return windows;
    }

    let span = Duration::days(window_days.clamp(1, MAX_WINDOW_SPAN) - 1);
    let mut cursor = end;
    loop {
        let raw_start = cursor.checked_sub_signed(span).unwrap_or(start);
        let aligned = next_bucket_start(timeframe, raw_start).min(bucket_start(timeframe, cursor));
        let window_start = aligned.max(start);
        windows.push(WindowRequest {
            symbol: symbol.to_string(),
            window_start: window_start.and_time(NaiveTime::MIN),
            window_end: cursor.and_time(NaiveTime::MIN),
            granularity: Granularity::Period(timeframe),
        });

        if window_start <= start {
            break;
        }
        cursor = window_start - Duration::days(1);
    }

    windows
}

/// Upper bound on a planned span, in days or minutes
const MAX_WINDOW_SPAN: i64 = 3_000_000;

/// Intraday windows over `[start, end]`, newest first.
///
/// Each trading date is walked from the session close (or `end`) back to the
/// session open (or `start`); weekends are skipped. `window_end` is the anchor
/// the vendor walks backward from.
pub fn plan_minute_windows(
    symbol: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
    window_minutes: i64,
    session: SessionHours,
) -> Vec<WindowRequest> {
    let mut windows = Vec::new();
    if start > end {
        return windows;
    }

    let span = Duration::minutes(window_minutes.clamp(1, MAX_WINDOW_SPAN) - 1);
    let mut date = end.date();

    while date >= start.date() {
        if is_trading_weekday(date) {
            let upper = if date == end.date() { end.time().min(session.close) } else { session.close };
            let lower = if date == start.date() { start.time().max(session.open) } else { session.open };

            if upper >= lower {
                let lower_dt = date.and_time(lower);
                let mut cursor = date.and_time(upper);
                loop {
                    let window_start = (cursor - span).max(lower_dt);
                    windows.push(WindowRequest {
                        symbol: symbol.to_string(),
                        window_start,
                        window_end: cursor,
                        granularity: Granularity::Minute,
                    });

                    if window_start <= lower_dt {
                        break;
                    }
                    cursor = window_start - Duration::minutes(1);
                }
            }
        }

        date = date - Duration::days(1);
    }

    windows
}
