/// Core type definitions for the KIS client
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV candle, one per (symbol, time bucket)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Start of the bucket (exchange-local time converted to UTC)
    pub timestamp: DateTime<Utc>,
    pub timestamp_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Candle {
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64, volume: i64) -> Self {
        Candle {
            timestamp,
            timestamp_ms: timestamp.timestamp_millis(),
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Live trade tick from the streaming feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub timestamp_ms: i64,
    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    /// Cumulative session volume
    pub volume: i64,
    /// Change vs. previous close, negative on a falling day
    pub change: f64,
    pub change_percent: f64,
}

/// Current price snapshot from the REST quote endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub last: f64,
    pub volume: i64,
    pub change: f64,
    pub change_percent: f64,
}

/// One price level of an order book
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: f64,
    pub amount: i64,
}

/// Order book (up to 10 levels per side)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    /// Best bid first
    pub bids: Vec<OrderBookLevel>,
    /// Best ask first
    pub asks: Vec<OrderBookLevel>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<&OrderBookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&OrderBookLevel> {
        self.asks.first()
    }
}

/// Trade side (Buy or Sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &str {
        match self {
            OrderType::Limit => "limit",
            OrderType::Market => "market",
        }
    }

    /// Vendor `ORD_DVSN` code
    pub fn division_code(&self) -> &'static str {
        match self {
            OrderType::Limit => "00",
            OrderType::Market => "01",
        }
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Closed,
    Canceled,
}

/// Order record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub amount: i64,
    /// `None` for market orders
    pub price: Option<i64>,
    pub filled: i64,
    pub remaining: i64,
    pub timestamp: DateTime<Utc>,
}

/// Held position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub name: String,
    pub amount: i64,
    pub average_price: f64,
    pub current_price: f64,
    pub unrealized_pnl: f64,
    pub unrealized_pnl_percent: f64,
}

/// Account balance summary with held positions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    /// Total valuation
    pub total: f64,
    /// Orderable cash
    pub free: f64,
    pub deposit: f64,
    pub total_pnl: f64,
    pub total_pnl_percent: f64,
    pub positions: Vec<Position>,
}

impl Balance {
    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }
}

/// Candle period for daily-or-longer queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1d")]
    Day,
    #[serde(rename = "1w")]
    Week,
    #[serde(rename = "1M")]
    Month,
    #[serde(rename = "1y")]
    Year,
}

impl Timeframe {
    /// Vendor `FID_PERIOD_DIV_CODE`
    pub fn period_code(&self) -> &'static str {
        match self {
            Timeframe::Day => "D",
            Timeframe::Week => "W",
            Timeframe::Month => "M",
            Timeframe::Year => "Y",
        }
    }

    /// Approximate trading days in one bucket
    pub fn trading_days(&self) -> i64 {
        match self {
            Timeframe::Day => 1,
            Timeframe::Week => 5,
            Timeframe::Month => 21,
            Timeframe::Year => 250,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1d" | "D" => Some(Timeframe::Day),
            "1w" | "W" => Some(Timeframe::Week),
            "1M" | "M" => Some(Timeframe::Month),
            "1y" | "Y" => Some(Timeframe::Year),
            _ => None,
        }
    }
}

/// Trading environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Simulated trading (모의투자)
    Paper,
    Live,
}
