/// Blocking wrapper over the async client
///
/// Every call drives the async implementation to completion on a runtime
/// owned by the client, so observable behaviour is identical. Must not be used
/// from inside another tokio runtime.
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, Runtime};

use crate::broker::client::KisClient as AsyncClient;
use crate::broker::feed_codec::Channel;
use crate::broker::token_store::TokenStore;
use crate::broker::websocket::FeedStream;
use crate::config::KisConfig;
use crate::data::range_aggregator::CancelToken;
use crate::error::Result;
use crate::types::{Balance, Candle, Order, OrderBook, OrderType, Side, Tick, Ticker, Timeframe};

/// Iterator over a realtime subscription; `next` blocks until a value arrives
pub struct BlockingStream<T> {
    stream: FeedStream<T>,
    handle: Handle,
}

impl<T> BlockingStream<T> {
    pub fn symbol(&self) -> &str {
        self.stream.symbol()
    }
}

impl<T> Iterator for BlockingStream<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.handle.block_on(self.stream.recv())
    }
}

pub struct KisClient {
    inner: AsyncClient,
    // One worker keeps the feed reader running between calls
    runtime: Runtime,
}

impl KisClient {
    pub fn new(config: KisConfig) -> Result<Self> {
        Self::build(|| AsyncClient::new(config))
    }

    pub fn from_env() -> Result<Self> {
        Self::build(AsyncClient::from_env)
    }

    pub fn with_token_store(config: KisConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        Self::build(|| AsyncClient::with_token_store(config, store))
    }

    fn build(make: impl FnOnce() -> Result<AsyncClient>) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        let inner = {
            let _guard = runtime.enter();
            make()?
        };
        Ok(KisClient { inner, runtime })
    }

    /// The async client, for callers that mix both styles
    pub fn as_async(&self) -> &AsyncClient {
        &self.inner
    }

    pub fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        self.runtime.block_on(self.inner.fetch_ticker(symbol))
    }

    pub fn fetch_order_book(&self, symbol: &str) -> Result<OrderBook> {
        self.runtime.block_on(self.inner.fetch_order_book(symbol))
    }

    pub fn fetch_ohlcv(&self, symbol: &str, timeframe: Timeframe, limit: Option<usize>) -> Result<Vec<Candle>> {
        self.runtime.block_on(self.inner.fetch_ohlcv(symbol, timeframe, limit))
    }

    pub fn fetch_minute_ohlcv(&self, symbol: &str, anchor: Option<NaiveTime>) -> Result<Vec<Candle>> {
        self.runtime.block_on(self.inner.fetch_minute_ohlcv(symbol, anchor))
    }

    pub fn fetch_ohlcv_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Candle>> {
        self.runtime
            .block_on(self.inner.fetch_ohlcv_range(symbol, timeframe, start, end))
    }

    /// Cancel from another thread via a clone of `cancel`
    pub fn fetch_ohlcv_range_with_cancel(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: NaiveDate,
        end: Option<NaiveDate>,
        cancel: &CancelToken,
    ) -> Result<Vec<Candle>> {
        self.runtime.block_on(
            self.inner
                .fetch_ohlcv_range_with_cancel(symbol, timeframe, start, end, cancel),
        )
    }

    pub fn fetch_minute_ohlcv_range(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
        interval: u32,
    ) -> Result<Vec<Candle>> {
        self.runtime
            .block_on(self.inner.fetch_minute_ohlcv_range(symbol, start, end, interval))
    }

    pub fn fetch_minute_ohlcv_range_with_cancel(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
        interval: u32,
        cancel: &CancelToken,
    ) -> Result<Vec<Candle>> {
        self.runtime.block_on(
            self.inner
                .fetch_minute_ohlcv_range_with_cancel(symbol, start, end, interval, cancel),
        )
    }

    pub fn create_order(
        &self,
        symbol: &str,
        side: Side,
        order_type: OrderType,
        amount: i64,
        price: Option<i64>,
    ) -> Result<Order> {
        self.runtime
            .block_on(self.inner.create_order(symbol, side, order_type, amount, price))
    }

    pub fn create_limit_order(&self, symbol: &str, side: Side, amount: i64, price: i64) -> Result<Order> {
        self.runtime
            .block_on(self.inner.create_limit_order(symbol, side, amount, price))
    }

    pub fn create_market_order(&self, symbol: &str, side: Side, amount: i64) -> Result<Order> {
        self.runtime.block_on(self.inner.create_market_order(symbol, side, amount))
    }

    pub fn modify_order(&self, order_id: &str, symbol: &str, price: i64, amount: Option<i64>) -> Result<Order> {
        self.runtime
            .block_on(self.inner.modify_order(order_id, symbol, price, amount))
    }

    pub fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<Order> {
        self.runtime.block_on(self.inner.cancel_order(order_id, symbol))
    }

    pub fn fetch_open_orders(&self) -> Result<Vec<Order>> {
        self.runtime.block_on(self.inner.fetch_open_orders())
    }

    pub fn fetch_balance(&self) -> Result<Balance> {
        self.runtime.block_on(self.inner.fetch_balance())
    }

    pub fn watch_ticker(&self, symbol: &str) -> Result<BlockingStream<Tick>> {
        let stream = self.runtime.block_on(self.inner.watch_ticker(symbol))?;
        Ok(BlockingStream { stream, handle: self.runtime.handle().clone() })
    }

    pub fn watch_order_book(&self, symbol: &str) -> Result<BlockingStream<OrderBook>> {
        let stream = self.runtime.block_on(self.inner.watch_order_book(symbol))?;
        Ok(BlockingStream { stream, handle: self.runtime.handle().clone() })
    }

    pub fn unsubscribe(&self, channel: Channel, symbol: &str) -> Result<()> {
        self.runtime.block_on(self.inner.unsubscribe(channel, symbol))
    }

    pub fn close(&self) -> Result<()> {
        self.runtime.block_on(self.inner.close())
    }
}
