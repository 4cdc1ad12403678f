/// KIS REST/WebSocket endpoints and transaction ids (tr_id)
use crate::types::Environment;

pub const REST_URL_LIVE: &str = "https://openapi.koreainvestment.com:9443";
pub const REST_URL_PAPER: &str = "https://openapivts.koreainvestment.com:29443";

pub const WS_URL_LIVE: &str = "ws://ops.koreainvestment.com:21000";
pub const WS_URL_PAPER: &str = "ws://ops.koreainvestment.com:31000";

// Authentication
pub const TOKEN: &str = "/oauth2/tokenP";
pub const APPROVAL: &str = "/oauth2/Approval";

// Quotations (domestic stock)
pub const PRICE: &str = "/uapi/domestic-stock/v1/quotations/inquire-price";
pub const ORDERBOOK: &str = "/uapi/domestic-stock/v1/quotations/inquire-asking-price-exp-ccn";
pub const DAILY_PRICE: &str = "/uapi/domestic-stock/v1/quotations/inquire-daily-price";
pub const DAILY_CHART: &str = "/uapi/domestic-stock/v1/quotations/inquire-daily-itemchartprice";
pub const MINUTE_CHART_TODAY: &str = "/uapi/domestic-stock/v1/quotations/inquire-time-itemchartprice";
pub const MINUTE_CHART_DAILY: &str = "/uapi/domestic-stock/v1/quotations/inquire-time-dailychartprice";

// Trading (domestic stock)
pub const ORDER: &str = "/uapi/domestic-stock/v1/trading/order-cash";
pub const ORDER_MODIFY: &str = "/uapi/domestic-stock/v1/trading/order-rvsecncl";
pub const BALANCE: &str = "/uapi/domestic-stock/v1/trading/inquire-balance";
pub const OPEN_ORDERS: &str = "/uapi/domestic-stock/v1/trading/inquire-psbl-rvsecncl";

/// Market division code for stocks/ETF/ETN
pub const MARKET_STOCK: &str = "J";

/// Per-call item caps
pub const DAILY_CHART_CAP: usize = 100;
pub const MINUTE_CHART_DAILY_CAP: usize = 120;

pub mod tr_id {
    // Quotations (same for paper and live)
    pub const PRICE: &str = "FHKST01010100";
    pub const ORDERBOOK: &str = "FHKST01010200";
    pub const DAILY_PRICE: &str = "FHKST01010400";
    pub const DAILY_CHART: &str = "FHKST03010100";
    pub const MINUTE_CHART_TODAY: &str = "FHKST03010200";
    pub const MINUTE_CHART_DAILY: &str = "FHKST03010230";

    // Realtime feed
    pub const WS_TICKER: &str = "H0STCNT0";
    pub const WS_ORDERBOOK: &str = "H0STASP0";
}

/// Trading tr_ids that differ between paper and live
#[derive(Debug, Clone, Copy)]
pub enum TradingTr {
    Buy,
    Sell,
    Modify,
    Balance,
    OpenOrders,
}

impl TradingTr {
    pub fn id(&self, environment: Environment) -> &'static str {
        match (self, environment) {
            (TradingTr::Buy, Environment::Live) => "TTTC0802U",
            (TradingTr::Buy, Environment::Paper) => "VTTC0802U",
            (TradingTr::Sell, Environment::Live) => "TTTC0801U",
            (TradingTr::Sell, Environment::Paper) => "VTTC0801U",
            (TradingTr::Modify, Environment::Live) => "TTTC0803U",
            (TradingTr::Modify, Environment::Paper) => "VTTC0803U",
            (TradingTr::Balance, Environment::Live) => "TTTC8434R",
            (TradingTr::Balance, Environment::Paper) => "VTTC8434R",
            (TradingTr::OpenOrders, Environment::Live) => "TTTC8036R",
            (TradingTr::OpenOrders, Environment::Paper) => "VTTC8036R",
        }
    }
}

impl Environment {
    pub fn rest_url(&self) -> &'static str {
        match self {
            Environment::Live => REST_URL_LIVE,
            Environment::Paper => REST_URL_PAPER,
        }
    }

    pub fn ws_url(&self) -> &'static str {
        match self {
            Environment::Live => WS_URL_LIVE,
            Environment::Paper => WS_URL_PAPER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trading_tr_ids() {
        assert_eq!(TradingTr::Buy.id(Environment::Paper), "VTTC0802U");
        assert_eq!(TradingTr::Buy.id(Environment::Live), "TTTC0802U");
        assert_eq!(TradingTr::OpenOrders.id(Environment::Paper), "VTTC8036R");
    }
}
