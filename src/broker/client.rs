/// Async KIS client: one entry point over auth, REST APIs, range retrieval and the realtime feed
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::broker::account::AccountApi;
use crate::broker::auth::AuthManager;
use crate::broker::feed_codec::Channel;
use crate::broker::orders::OrderApi;
use crate::broker::quote::QuoteApi;
use crate::broker::token_store::{FileTokenStore, TokenStore};
use crate::broker::transport::Transport;
use crate::broker::websocket::{OrderBookStream, StreamingFeed, TickerStream};
use crate::config::{load_config_from_env, validate_config, KisConfig};
use crate::data::range_aggregator::{CancelToken, RangeAggregator, RangeOptions};
use crate::error::Result;
use crate::types::{Balance, Candle, Order, OrderBook, OrderType, Side, Ticker, Timeframe};
use crate::utils::RateLimiter;

/// KIS domestic-stock client.
///
/// The realtime feed is connected on the first `watch_*` call and stays open
/// until [`KisClient::close`].
pub struct KisClient {
    config: KisConfig,
    auth: Arc<AuthManager>,
    quote: QuoteApi,
    orders: OrderApi,
    account: AccountApi,
    history: RangeAggregator<QuoteApi>,
    ws_url: String,
    feed: Mutex<Option<Arc<StreamingFeed>>>,
}

impl KisClient {
    /// Client with the file token cache (`token_dir` or `~/.kis`)
    pub fn new(config: KisConfig) -> Result<Self> {
        let dir = config
            .token_dir
            .clone()
            .unwrap_or_else(FileTokenStore::default_dir);
        Self::with_token_store(config, Arc::new(FileTokenStore::new(dir)))
    }

    /// Client built from `KIS_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(load_config_from_env()?)
    }

    pub fn with_token_store(config: KisConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        validate_config(&config)?;

        let environment = config.environment;
        let rest_url = config
            .rest_base_url
            .clone()
            .unwrap_or_else(|| environment.rest_url().to_string());
        let ws_url = config
            .ws_url
            .clone()
            .unwrap_or_else(|| environment.ws_url().to_string());

        let auth_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let auth = Arc::new(AuthManager::with_client(
            config.app_key.clone(),
            config.app_secret.clone(),
            rest_url.clone(),
            store,
            config.safety_margin(),
            auth_client,
        ));

        let limiter = config.requests_per_second.map(RateLimiter::new);
        let transport = Arc::new(Transport::new(
            rest_url.clone(),
            Arc::clone(&auth),
            config.request_timeout(),
            limiter,
        )?);

        let (cano, product_code) = config.account_parts();
        let quote = QuoteApi::new(Arc::clone(&transport));
        let orders = OrderApi::new(Arc::clone(&transport), environment, cano.clone(), product_code.clone());
        let account = AccountApi::new(Arc::clone(&transport), environment, cano, product_code);
        let history = RangeAggregator::new(
            quote.clone(),
            RangeOptions::from_config(&config.history, environment),
        );

        info!("KIS client ready ({:?}, {})", environment, rest_url);

        Ok(KisClient {
            config,
            auth,
            quote,
            orders,
            account,
            history,
            ws_url,
            feed: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &KisConfig {
        &self.config
    }

    pub fn auth(&self) -> &Arc<AuthManager> {
        &self.auth
    }

    // Quotations

    pub async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        self.quote.fetch_ticker(symbol).await
    }

    pub async fn fetch_order_book(&self, symbol: &str) -> Result<OrderBook> {
        self.quote.fetch_order_book(symbol).await
    }

    pub async fn fetch_ohlcv(&self, symbol: &str, timeframe: Timeframe, limit: Option<usize>) -> Result<Vec<Candle>> {
        self.quote.fetch_ohlcv(symbol, timeframe, limit).await
    }

    pub async fn fetch_minute_ohlcv(&self, symbol: &str, anchor: Option<NaiveTime>) -> Result<Vec<Candle>> {
        self.quote.fetch_minute_ohlcv(symbol, anchor).await
    }

    // Historical ranges

    /// Every bucket in `[start, end]` (end defaults to today), oldest first
    pub async fn fetch_ohlcv_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Candle>> {
        self.history.fetch_ohlcv_range(symbol, timeframe, start, end, None).await
    }

    pub async fn fetch_ohlcv_range_with_cancel(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: NaiveDate,
        end: Option<NaiveDate>,
        cancel: &CancelToken,
    ) -> Result<Vec<Candle>> {
        self.history
            .fetch_ohlcv_range(symbol, timeframe, start, end, Some(cancel))
            .await
    }

    /// Minute candles in `[start, end]` at `interval` minutes, oldest first
    pub async fn fetch_minute_ohlcv_range(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
        interval: u32,
    ) -> Result<Vec<Candle>> {
        self.history
            .fetch_minute_ohlcv_range(symbol, start, end, interval, None)
            .await
    }

    pub async fn fetch_minute_ohlcv_range_with_cancel(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
        interval: u32,
        cancel: &CancelToken,
    ) -> Result<Vec<Candle>> {
        self.history
            .fetch_minute_ohlcv_range(symbol, start, end, interval, Some(cancel))
            .await
    }

    // Orders

    pub async fn create_order(
        &self,
        symbol: &str,
        side: Side,
        order_type: OrderType,
        amount: i64,
        price: Option<i64>,
    ) -> Result<Order> {
        self.orders.create_order(symbol, side, order_type, amount, price).await
    }

    pub async fn create_limit_order(&self, symbol: &str, side: Side, amount: i64, price: i64) -> Result<Order> {
        self.orders.create_limit_order(symbol, side, amount, price).await
    }

    pub async fn create_market_order(&self, symbol: &str, side: Side, amount: i64) -> Result<Order> {
        self.orders.create_market_order(symbol, side, amount).await
    }

    pub async fn modify_order(&self, order_id: &str, symbol: &str, price: i64, amount: Option<i64>) -> Result<Order> {
        self.orders.modify_order(order_id, symbol, price, amount).await
    }

    pub async fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<Order> {
        self.orders.cancel_order(order_id, symbol).await
    }

    pub async fn fetch_open_orders(&self) -> Result<Vec<Order>> {
        self.orders.fetch_open_orders().await
    }

    // Account

    pub async fn fetch_balance(&self) -> Result<Balance> {
        self.account.fetch_balance().await
    }

    // Realtime

    pub async fn watch_ticker(&self, symbol: &str) -> Result<TickerStream> {
        self.feed().await?.watch_ticker(symbol).await
    }

    pub async fn watch_order_book(&self, symbol: &str) -> Result<OrderBookStream> {
        self.feed().await?.watch_order_book(symbol).await
    }

    pub async fn unsubscribe(&self, channel: Channel, symbol: &str) -> Result<()> {
        let feed = self.feed.lock().await.clone();
        match feed {
            Some(feed) => feed.unsubscribe(channel, symbol).await,
            None => Ok(()),
        }
    }

    /// Close the realtime feed, if one was opened
    pub async fn close(&self) -> Result<()> {
        let feed = self.feed.lock().await.take();
        if let Some(feed) = feed {
            feed.close().await?;
        }
        Ok(())
    }

    /// Connected feed; opens a new socket on first use or once the previous one has closed
    async fn feed(&self) -> Result<Arc<StreamingFeed>> {
        let mut slot = self.feed.lock().await;
        if let Some(feed) = slot.as_ref() {
            if feed.is_connected().await {
                return Ok(Arc::clone(feed));
            }
        }

        let approval_key = self.auth.issue_approval_key().await?;
        let feed = Arc::new(StreamingFeed::connect(&self.ws_url, approval_key).await?);
        *slot = Some(Arc::clone(&feed));
        Ok(feed)
    }
}
