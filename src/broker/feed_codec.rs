/// Realtime frame codec: control/data classification and positional decoding
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use crate::broker::endpoints::tr_id;
use crate::broker::quote::is_falling;
use crate::error::{KisError, Result};
use crate::types::{OrderBook, OrderBookLevel, Tick};
use crate::utils::{kst_to_utc, parse_vendor_time, strict_f64, strict_i64};

/// Fields the ticker decoder reads (up to accumulated volume at 13)
pub const TICKER_MIN_FIELDS: usize = 20;
/// Symbol, time, class code, then 10 ask/bid prices and quantities
pub const ORDER_BOOK_MIN_FIELDS: usize = 43;

const ORDER_BOOK_DEPTH: usize = 10;

/// Realtime channels the feed can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Ticker,
    OrderBook,
}

impl Channel {
    pub fn tr_id(&self) -> &'static str {
        match self {
            Channel::Ticker => tr_id::WS_TICKER,
            Channel::OrderBook => tr_id::WS_ORDERBOOK,
        }
    }

    pub fn from_tr_id(id: &str) -> Option<Self> {
        match id {
            tr_id::WS_TICKER => Some(Channel::Ticker),
            tr_id::WS_ORDERBOOK => Some(Channel::OrderBook),
            _ => None,
        }
    }
}

/// One text frame from the socket
#[derive(Debug, PartialEq)]
pub enum Frame<'a> {
    /// Heartbeat the server expects echoed back verbatim
    PingPong,
    Control(ControlFrame),
    Data(DataFrame<'a>),
    /// Neither JSON nor `header|count|trId|payload`
    Malformed,
}

/// JSON control frame (subscription acks, errors)
#[derive(Debug, Clone, PartialEq)]
pub struct ControlFrame {
    pub tr_id: String,
    pub tr_key: String,
    pub rt_cd: String,
    pub msg_cd: String,
    pub msg: String,
}

impl ControlFrame {
    pub fn is_success(&self) -> bool {
        self.rt_cd == "0"
    }
}

/// `header|count|trId|payload` with `^`-separated positional fields
#[derive(Debug, PartialEq)]
pub struct DataFrame<'a> {
    pub encrypted: bool,
    pub tr_id: &'a str,
    pub count: usize,
    pub payload: &'a str,
}

impl<'a> DataFrame<'a> {
    /// Split the payload into one field list per record
    pub fn records(&self) -> Vec<Vec<&'a str>> {
        let fields: Vec<&'a str> = self.payload.split('^').collect();
        if self.count <= 1 || fields.len() % self.count != 0 {
            return vec![fields];
        }
        let per_record = fields.len() / self.count;
        fields.chunks(per_record).map(|chunk| chunk.to_vec()).collect()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawControl {
    header: RawControlHeader,
    body: RawControlBody,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawControlHeader {
    tr_id: String,
    tr_key: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawControlBody {
    rt_cd: String,
    msg_cd: String,
    msg1: String,
}

/// Classify a text frame without decoding its fields
pub fn classify(text: &str) -> Frame<'_> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') {
        return match serde_json::from_str::<RawControl>(trimmed) {
            Ok(raw) if raw.header.tr_id == "PINGPONG" => Frame::PingPong,
            Ok(raw) => Frame::Control(ControlFrame {
                tr_id: raw.header.tr_id,
                tr_key: raw.header.tr_key,
                rt_cd: raw.body.rt_cd,
                msg_cd: raw.body.msg_cd,
                msg: raw.body.msg1,
            }),
            Err(_) => Frame::Malformed,
        };
    }

    let mut parts = text.splitn(4, '|');
    let (Some(header), Some(count), Some(tr), Some(payload)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Frame::Malformed;
    };

    let Ok(count) = count.trim().parse::<usize>() else {
        return Frame::Malformed;
    };

    Frame::Data(DataFrame {
        encrypted: header.trim() == "1",
        tr_id: tr.trim(),
        count,
        payload,
    })
}

/// Decode one `H0STCNT0` record.
///
/// Only the time of day is on the wire; `trade_date` supplies the KST date.
pub fn decode_tick(fields: &[&str], trade_date: NaiveDate) -> Result<Tick> {
    if fields.len() < TICKER_MIN_FIELDS {
        return Err(KisError::Decode(format!(
            "ticker frame has {} fields, need {}",
            fields.len(),
            TICKER_MIN_FIELDS
        )));
    }

    let time = parse_vendor_time(fields[1])
        .ok_or_else(|| KisError::Decode(format!("bad trade time {:?}", fields[1])))?;
    let timestamp = kst_to_utc(trade_date.and_time(time));

    let mut change = number(fields, 4)?;
    let mut change_percent = number(fields, 5)?;
    if is_falling(fields[3]) {
        change = -change.abs();
        change_percent = -change_percent.abs();
    }

    Ok(Tick {
        symbol: fields[0].trim().to_string(),
        timestamp,
        timestamp_ms: timestamp.timestamp_millis(),
        price: number(fields, 2)?,
        open: number(fields, 7)?,
        high: number(fields, 8)?,
        low: number(fields, 9)?,
        volume: integer(fields, 13)?,
        change,
        change_percent,
    })
}

/// Decode one `H0STASP0` record; zero-price levels are dropped
pub fn decode_order_book(fields: &[&str], trade_date: NaiveDate) -> Result<OrderBook> {
    if fields.len() < ORDER_BOOK_MIN_FIELDS {
        return Err(KisError::Decode(format!(
            "order book frame has {} fields, need {}",
            fields.len(),
            ORDER_BOOK_MIN_FIELDS
        )));
    }

    let time = parse_vendor_time(fields[1])
        .ok_or_else(|| KisError::Decode(format!("bad quote time {:?}", fields[1])))?;

    let mut asks = Vec::with_capacity(ORDER_BOOK_DEPTH);
    let mut bids = Vec::with_capacity(ORDER_BOOK_DEPTH);
    for i in 0..ORDER_BOOK_DEPTH {
        let ask = OrderBookLevel {
            price: number(fields, 3 + i)?,
            amount: integer(fields, 23 + i)?,
        };
        if ask.price > 0.0 {
            asks.push(ask);
        }

        let bid = OrderBookLevel {
            price: number(fields, 13 + i)?,
            amount: integer(fields, 33 + i)?,
        };
        if bid.price > 0.0 {
            bids.push(bid);
        }
    }

    Ok(OrderBook {
        symbol: fields[0].trim().to_string(),
        timestamp: kst_to_utc(trade_date.and_time(time)),
        bids,
        asks,
    })
}

/// Register (`subscribe == true`) or release one `(tr_id, symbol)` pair
pub fn subscription_message(approval_key: &str, channel: Channel, symbol: &str, subscribe: bool) -> String {
    json!({
        "header": {
            "approval_key": approval_key,
            "custtype": "P",
            "tr_type": if subscribe { "1" } else { "2" },
            "content-type": "utf-8",
        },
        "body": {
            "input": {
                "tr_id": channel.tr_id(),
                "tr_key": symbol,
            }
        }
    })
    .to_string()
}

fn number(fields: &[&str], idx: usize) -> Result<f64> {
    strict_f64(fields[idx])
        .ok_or_else(|| KisError::Decode(format!("field {} is not numeric: {:?}", idx, fields[idx])))
}

fn integer(fields: &[&str], idx: usize) -> Result<i64> {
    strict_i64(fields[idx])
        .ok_or_else(|| KisError::Decode(format!("field {} is not an integer: {:?}", idx, fields[idx])))
}
