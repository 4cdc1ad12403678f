/// Quotation calls: current price, order book and candle history
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::broker::endpoints::{self, tr_id};
use crate::broker::transport::Transport;
use crate::data::windows::{Granularity, WindowFetcher, WindowRequest};
use crate::error::Result;
use crate::types::{Candle, OrderBook, OrderBookLevel, Ticker, Timeframe};
use crate::utils::{
    format_vendor_date, format_vendor_time, kst_to_utc, lenient_f64, lenient_i64, now_kst,
    parse_vendor_date, parse_vendor_time,
};

/// Order book depth served by the REST endpoint
const ORDER_BOOK_LEVELS: usize = 10;

#[derive(Debug, Deserialize)]
struct PriceResponse {
    #[serde(default)]
    output: PriceOutput,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PriceOutput {
    hts_kor_isnm: String,
    stck_prpr: String,
    stck_oprc: String,
    stck_hgpr: String,
    stck_lwpr: String,
    acml_vol: String,
    prdy_vrss: String,
    prdy_vrss_sign: String,
    prdy_ctrt: String,
}

#[derive(Debug, Deserialize)]
struct OrderBookResponse {
    #[serde(default)]
    output1: Value,
}

#[derive(Debug, Deserialize)]
struct DailyPriceResponse {
    #[serde(default)]
    output: Vec<ChartRow>,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    #[serde(default)]
    output2: Vec<ChartRow>,
}

/// Row shared by the daily and minute chart endpoints
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChartRow {
    stck_bsop_date: String,
    stck_cntg_hour: String,
    stck_oprc: String,
    stck_hgpr: String,
    stck_lwpr: String,
    stck_clpr: String,
    stck_prpr: String,
    acml_vol: String,
    cntg_vol: String,
}

impl ChartRow {
    /// Daily-or-longer bucket; rows without a parsable date are padding
    fn to_period_candle(&self) -> Option<Candle> {
        let date = parse_vendor_date(&self.stck_bsop_date)?;
        Some(Candle::new(
            kst_to_utc(date.and_time(NaiveTime::MIN)),
            lenient_f64(&self.stck_oprc),
            lenient_f64(&self.stck_hgpr),
            lenient_f64(&self.stck_lwpr),
            lenient_f64(&self.stck_clpr),
            lenient_i64(&self.acml_vol),
        ))
    }

    /// 1-minute bucket; close is the last trade price of the minute
    fn to_minute_candle(&self, fallback_date: NaiveDate) -> Option<Candle> {
        let date = if self.stck_bsop_date.trim().is_empty() {
            fallback_date
        } else {
            parse_vendor_date(&self.stck_bsop_date)?
        };
        let time = parse_vendor_time(&self.stck_cntg_hour)?;
        Some(Candle::new(
            kst_to_utc(date.and_time(time)),
            lenient_f64(&self.stck_oprc),
            lenient_f64(&self.stck_hgpr),
            lenient_f64(&self.stck_lwpr),
            lenient_f64(&self.stck_prpr),
            lenient_i64(&self.cntg_vol),
        ))
    }
}

/// Falling-day sign codes (`4` lower limit, `5` down)
pub(crate) fn is_falling(sign: &str) -> bool {
    matches!(sign.trim(), "4" | "5")
}

/// Quotation API for domestic stocks
#[derive(Clone)]
pub struct QuoteApi {
    transport: Arc<Transport>,
}

impl QuoteApi {
    pub fn new(transport: Arc<Transport>) -> Self {
        QuoteApi { transport }
    }

    /// Current price snapshot
    pub async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        let response: PriceResponse = self
            .transport
            .get(
                endpoints::PRICE,
                tr_id::PRICE,
                &[
                    ("FID_COND_MRKT_DIV_CODE", endpoints::MARKET_STOCK),
                    ("FID_INPUT_ISCD", symbol),
                ],
            )
            .await?;

        let output = response.output;
        let mut change = lenient_f64(&output.prdy_vrss);
        let mut change_percent = lenient_f64(&output.prdy_ctrt);
        if is_falling(&output.prdy_vrss_sign) {
            change = -change.abs();
            change_percent = -change_percent.abs();
        }

        let name = Some(output.hts_kor_isnm.trim().to_string()).filter(|n| !n.is_empty());

        Ok(Ticker {
            symbol: symbol.to_string(),
            name,
            timestamp: Utc::now(),
            open: lenient_f64(&output.stck_oprc),
            high: lenient_f64(&output.stck_hgpr),
            low: lenient_f64(&output.stck_lwpr),
            last: lenient_f64(&output.stck_prpr),
            volume: lenient_i64(&output.acml_vol),
            change,
            change_percent,
        })
    }

    /// 10-level order book; empty levels are dropped
    pub async fn fetch_order_book(&self, symbol: &str) -> Result<OrderBook> {
        let response: OrderBookResponse = self
            .transport
            .get(
                endpoints::ORDERBOOK,
                tr_id::ORDERBOOK,
                &[
                    ("FID_COND_MRKT_DIV_CODE", endpoints::MARKET_STOCK),
                    ("FID_INPUT_ISCD", symbol),
                ],
            )
            .await?;

        let output = &response.output1;
        let field = |name: String| output.get(&name).and_then(Value::as_str).unwrap_or_default();

        let mut bids = Vec::with_capacity(ORDER_BOOK_LEVELS);
        let mut asks = Vec::with_capacity(ORDER_BOOK_LEVELS);
        for i in 1..=ORDER_BOOK_LEVELS {
            let bid = OrderBookLevel {
                price: lenient_f64(field(format!("bidp{}", i))),
                amount: lenient_i64(field(format!("bidp_rsqn{}", i))),
            };
            if bid.price > 0.0 {
                bids.push(bid);
            }

            let ask = OrderBookLevel {
                price: lenient_f64(field(format!("askp{}", i))),
                amount: lenient_i64(field(format!("askp_rsqn{}", i))),
            };
            if ask.price > 0.0 {
                asks.push(ask);
            }
        }

        Ok(OrderBook {
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            bids,
            asks,
        })
    }

    /// Most recent `limit` buckets (vendor serves about 30), oldest first
    pub async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: Option<usize>,
    ) -> Result<Vec<Candle>> {
        let response: DailyPriceResponse = self
            .transport
            .get(
                endpoints::DAILY_PRICE,
                tr_id::DAILY_PRICE,
                &[
                    ("FID_COND_MRKT_DIV_CODE", endpoints::MARKET_STOCK),
                    ("FID_INPUT_ISCD", symbol),
                    ("FID_PERIOD_DIV_CODE", timeframe.period_code()),
                    ("FID_ORG_ADJ_PRC", "0"),
                ],
            )
            .await?;

        // Vendor order is newest first
        let mut candles: Vec<Candle> = response
            .output
            .iter()
            .filter_map(ChartRow::to_period_candle)
            .collect();
        if let Some(limit) = limit {
            candles.truncate(limit);
        }
        candles.reverse();

        debug!("{} {:?}: {} recent candles", symbol, timeframe, candles.len());
        Ok(candles)
    }

    /// Today's 1-minute candles walking back from `anchor` (default: now), oldest first
    pub async fn fetch_minute_ohlcv(
        &self,
        symbol: &str,
        anchor: Option<NaiveTime>,
    ) -> Result<Vec<Candle>> {
        let now = now_kst();
        let anchor = format_vendor_time(anchor.unwrap_or_else(|| now.time()));

        let response: ChartResponse = self
            .transport
            .get(
                endpoints::MINUTE_CHART_TODAY,
                tr_id::MINUTE_CHART_TODAY,
                &[
                    ("FID_ETC_CLS_CODE", ""),
                    ("FID_COND_MRKT_DIV_CODE", endpoints::MARKET_STOCK),
                    ("FID_INPUT_ISCD", symbol),
                    ("FID_INPUT_HOUR_1", anchor.as_str()),
                    ("FID_PW_DATA_INCU_YN", "N"),
                ],
            )
            .await?;

        let today = now.date_naive();
        let mut candles: Vec<Candle> = response
            .output2
            .iter()
            .filter_map(|row| row.to_minute_candle(today))
            .collect();
        candles.sort_by_key(|c| c.timestamp);
        candles.dedup_by_key(|c| c.timestamp);

        Ok(candles)
    }

    /// One daily-chart call for `[start, end]`; up to 100 rows, newest first
    pub async fn fetch_daily_chart(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Candle>> {
        let start = format_vendor_date(start);
        let end = format_vendor_date(end);

        let response: ChartResponse = self
            .transport
            .get(
                endpoints::DAILY_CHART,
                tr_id::DAILY_CHART,
                &[
                    ("FID_COND_MRKT_DIV_CODE", endpoints::MARKET_STOCK),
                    ("FID_INPUT_ISCD", symbol),
                    ("FID_INPUT_DATE_1", start.as_str()),
                    ("FID_INPUT_DATE_2", end.as_str()),
                    ("FID_PERIOD_DIV_CODE", timeframe.period_code()),
                    ("FID_ORG_ADJ_PRC", "0"),
                ],
            )
            .await?;

        let candles: Vec<Candle> = response
            .output2
            .iter()
            .filter_map(ChartRow::to_period_candle)
            .collect();

        if candles.len() >= endpoints::DAILY_CHART_CAP {
            debug!("Daily chart {} [{}..{}] hit the per-call cap", symbol, start, end);
        }
        Ok(candles)
    }

    /// One minute-chart call walking back from `anchor` on its date; up to 120 rows
    pub async fn fetch_minute_chart(&self, symbol: &str, anchor: NaiveDateTime) -> Result<Vec<Candle>> {
        let date = format_vendor_date(anchor.date());
        let hour = format_vendor_time(anchor.time());

        let response: ChartResponse = self
            .transport
            .get(
                endpoints::MINUTE_CHART_DAILY,
                tr_id::MINUTE_CHART_DAILY,
                &[
                    ("FID_COND_MRKT_DIV_CODE", endpoints::MARKET_STOCK),
                    ("FID_INPUT_ISCD", symbol),
                    ("FID_INPUT_DATE_1", date.as_str()),
                    ("FID_INPUT_HOUR_1", hour.as_str()),
                    ("FID_PW_DATA_INCU_YN", "Y"),
                    ("FID_FAKE_TICK_INCU_YN", ""),
                ],
            )
            .await?;

        let candles: Vec<Candle> = response
            .output2
            .iter()
            .filter_map(|row| row.to_minute_candle(anchor.date()))
            .collect();

        if candles.len() >= endpoints::MINUTE_CHART_DAILY_CAP {
            debug!("Minute chart {} @ {} {} hit the per-call cap", symbol, date, hour);
        }
        Ok(candles)
    }
}

impl WindowFetcher for QuoteApi {
    fn fetch_window(
        &self,
        request: &WindowRequest,
    ) -> impl Future<Output = Result<Vec<Candle>>> + Send {
        async move {
            match request.granularity {
                Granularity::Period(timeframe) => {
                    self.fetch_daily_chart(
                        &request.symbol,
                        timeframe,
                        request.start_date(),
                        request.end_date(),
                    )
                    .await
                }
                Granularity::Minute => {
                    self.fetch_minute_chart(&request.symbol, request.window_end).await
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_row_parsing() {
        let row: ChartRow = serde_json::from_str(
            r#"{"stck_bsop_date":"20240102","stck_oprc":"78200","stck_hgpr":"79800",
                "stck_lwpr":"78200","stck_clpr":"79600","acml_vol":"17142847"}"#,
        )
        .unwrap();

        let candle = row.to_period_candle().unwrap();
        assert_eq!(candle.close, 79600.0);
        assert_eq!(candle.volume, 17_142_847);
        assert_eq!(
            candle.timestamp,
            kst_to_utc(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_time(NaiveTime::MIN))
        );
    }

    #[test]
    fn test_padding_row_skipped() {
        let row: ChartRow = serde_json::from_str(r#"{"stck_bsop_date":"","stck_clpr":""}"#).unwrap();
        assert!(row.to_period_candle().is_none());
    }

    #[test]
    fn test_minute_row_uses_last_price_as_close() {
        let row: ChartRow = serde_json::from_str(
            r#"{"stck_bsop_date":"20260114","stck_cntg_hour":"101500","stck_prpr":"57400",
                "stck_oprc":"57300","stck_hgpr":"57500","stck_lwpr":"57200","cntg_vol":"1520"}"#,
        )
        .unwrap();

        let fallback = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        let candle = row.to_minute_candle(fallback).unwrap();
        assert_eq!(candle.close, 57400.0);
        assert_eq!(candle.volume, 1520);
        assert_eq!(
            candle.timestamp,
            kst_to_utc(NaiveDate::from_ymd_opt(2026, 1, 14).unwrap().and_hms_opt(10, 15, 0).unwrap())
        );
    }

    #[test]
    fn test_falling_sign_codes() {
        assert!(is_falling("5"));
        assert!(is_falling("4"));
        assert!(!is_falling("2"));
        assert!(!is_falling("3"));
    }
}
