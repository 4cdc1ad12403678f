/// Cash order placement, modification, cancellation and open-order listing
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::broker::endpoints::{self, TradingTr};
use crate::broker::transport::Transport;
use crate::error::{KisError, Result};
use crate::types::{Environment, Order, OrderStatus, OrderType, Side};
use crate::utils::lenient_i64;

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct CashOrderRequest<'a> {
    cano: &'a str,
    acnt_prdt_cd: &'a str,
    pdno: &'a str,
    ord_dvsn: &'a str,
    ord_qty: String,
    ord_unpr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct ReviseCancelRequest<'a> {
    cano: &'a str,
    acnt_prdt_cd: &'a str,
    krx_fwdg_ord_orgno: &'a str,
    orgn_odno: &'a str,
    ord_dvsn: &'a str,
    rvse_cncl_dvsn_cd: &'a str,
    ord_qty: String,
    ord_unpr: String,
    qty_all_ord_yn: &'a str,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(default)]
    output: OrderOutput,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OrderOutput {
    #[serde(rename = "ODNO")]
    odno: String,
}

#[derive(Debug, Deserialize)]
struct OpenOrdersResponse {
    #[serde(default)]
    output: Vec<OpenOrderRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OpenOrderRow {
    odno: String,
    pdno: String,
    sll_buy_dvsn_cd: String,
    ord_dvsn_cd: String,
    ord_qty: String,
    ord_unpr: String,
    tot_ccld_qty: String,
    psbl_qty: String,
}

impl OpenOrderRow {
    fn to_order(&self) -> Order {
        // "01" sell, "02" buy
        let side = if self.sll_buy_dvsn_cd.trim() == "01" { Side::Sell } else { Side::Buy };
        let order_type = if self.ord_dvsn_cd.trim() == "01" { OrderType::Market } else { OrderType::Limit };
        let price = lenient_i64(&self.ord_unpr);

        Order {
            id: self.odno.trim().to_string(),
            symbol: self.pdno.trim().to_string(),
            side,
            order_type,
            status: OrderStatus::Open,
            amount: lenient_i64(&self.ord_qty),
            price: Some(price).filter(|p| *p > 0),
            filled: lenient_i64(&self.tot_ccld_qty),
            remaining: lenient_i64(&self.psbl_qty),
            timestamp: Utc::now(),
        }
    }
}

/// Order API for one account.
///
/// Vendor failures on this path surface as [`KisError::Order`] unless the
/// code maps to a more specific kind.
#[derive(Clone)]
pub struct OrderApi {
    transport: Arc<Transport>,
    environment: Environment,
    cano: String,
    product_code: String,
}

impl OrderApi {
    pub fn new(
        transport: Arc<Transport>,
        environment: Environment,
        cano: impl Into<String>,
        product_code: impl Into<String>,
    ) -> Self {
        OrderApi {
            transport,
            environment,
            cano: cano.into(),
            product_code: product_code.into(),
        }
    }

    /// Place a cash order; `price` is required for limit orders and ignored for market
    pub async fn create_order(
        &self,
        symbol: &str,
        side: Side,
        order_type: OrderType,
        amount: i64,
        price: Option<i64>,
    ) -> Result<Order> {
        if amount <= 0 {
            return Err(KisError::InvalidParameter(format!("order amount must be positive, got {}", amount)));
        }
        let price = match order_type {
            OrderType::Limit => Some(price.filter(|p| *p > 0).ok_or_else(|| {
                KisError::InvalidParameter("limit order requires a positive price".to_string())
            })?),
            OrderType::Market => None,
        };

        let tr = match side {
            Side::Buy => TradingTr::Buy,
            Side::Sell => TradingTr::Sell,
        };

        let request = CashOrderRequest {
            cano: &self.cano,
            acnt_prdt_cd: &self.product_code,
            pdno: symbol,
            ord_dvsn: order_type.division_code(),
            ord_qty: amount.to_string(),
            ord_unpr: price.unwrap_or(0).to_string(),
        };

        debug!("Placing {} {} order: {} x {} @ {:?}", side.as_str(), order_type.as_str(), symbol, amount, price);

        let response: OrderResponse = self
            .transport
            .post(endpoints::ORDER, tr.id(self.environment), &request)
            .await
            .map_err(KisError::into_order_error)?;

        let id = response.output.odno.trim().to_string();
        if id.is_empty() {
            return Err(KisError::Order {
                code: String::new(),
                message: "No order number in response".to_string(),
            });
        }

        info!("✅ Order placed: {} ({} {} x {})", id, side.as_str(), symbol, amount);

        Ok(Order {
            id,
            symbol: symbol.to_string(),
            side,
            order_type,
            status: OrderStatus::Open,
            amount,
            price,
            filled: 0,
            remaining: amount,
            timestamp: Utc::now(),
        })
    }

    pub async fn create_limit_order(&self, symbol: &str, side: Side, amount: i64, price: i64) -> Result<Order> {
        self.create_order(symbol, side, OrderType::Limit, amount, Some(price)).await
    }

    pub async fn create_market_order(&self, symbol: &str, side: Side, amount: i64) -> Result<Order> {
        self.create_order(symbol, side, OrderType::Market, amount, None).await
    }

    /// Re-price an open limit order; `amount` of `None` revises the whole remainder
    pub async fn modify_order(
        &self,
        order_id: &str,
        symbol: &str,
        price: i64,
        amount: Option<i64>,
    ) -> Result<Order> {
        if price <= 0 {
            return Err(KisError::InvalidParameter(format!("modify price must be positive, got {}", price)));
        }

        let request = ReviseCancelRequest {
            cano: &self.cano,
            acnt_prdt_cd: &self.product_code,
            krx_fwdg_ord_orgno: "",
            orgn_odno: order_id,
            ord_dvsn: OrderType::Limit.division_code(),
            rvse_cncl_dvsn_cd: "01",
            ord_qty: amount.unwrap_or(0).to_string(),
            ord_unpr: price.to_string(),
            qty_all_ord_yn: if amount.is_some() { "N" } else { "Y" },
        };

        let response: OrderResponse = self
            .transport
            .post(endpoints::ORDER_MODIFY, TradingTr::Modify.id(self.environment), &request)
            .await
            .map_err(KisError::into_order_error)?;

        let new_id = Some(response.output.odno.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| order_id.to_string());

        info!("Order {} modified -> {} @ {}", order_id, new_id, price);

        Ok(Order {
            id: new_id,
            symbol: symbol.to_string(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            status: OrderStatus::Open,
            amount: amount.unwrap_or(0),
            price: Some(price),
            filled: 0,
            remaining: amount.unwrap_or(0),
            timestamp: Utc::now(),
        })
    }

    /// Cancel the full remainder of an order
    pub async fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<Order> {
        let request = ReviseCancelRequest {
            cano: &self.cano,
            acnt_prdt_cd: &self.product_code,
            krx_fwdg_ord_orgno: "",
            orgn_odno: order_id,
            ord_dvsn: OrderType::Limit.division_code(),
            rvse_cncl_dvsn_cd: "02",
            ord_qty: "0".to_string(),
            ord_unpr: "0".to_string(),
            qty_all_ord_yn: "Y",
        };

        let _: OrderResponse = self
            .transport
            .post(endpoints::ORDER_MODIFY, TradingTr::Modify.id(self.environment), &request)
            .await
            .map_err(KisError::into_order_error)?;

        info!("Order {} cancelled", order_id);

        Ok(Order {
            id: order_id.to_string(),
            symbol: symbol.to_string(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            status: OrderStatus::Canceled,
            amount: 0,
            price: None,
            filled: 0,
            remaining: 0,
            timestamp: Utc::now(),
        })
    }

    /// Orders that can still be modified or cancelled
    pub async fn fetch_open_orders(&self) -> Result<Vec<Order>> {
        let response: OpenOrdersResponse = self
            .transport
            .get(
                endpoints::OPEN_ORDERS,
                TradingTr::OpenOrders.id(self.environment),
                &[
                    ("CANO", self.cano.as_str()),
                    ("ACNT_PRDT_CD", self.product_code.as_str()),
                    ("CTX_AREA_FK100", ""),
                    ("CTX_AREA_NK100", ""),
                    ("INQR_DVSN_1", "0"),
                    ("INQR_DVSN_2", "0"),
                ],
            )
            .await
            .map_err(KisError::into_order_error)?;

        let orders: Vec<Order> = response
            .output
            .iter()
            .filter(|row| !row.odno.trim().is_empty())
            .map(OpenOrderRow::to_order)
            .collect();

        debug!("{} open orders", orders.len());
        Ok(orders)
    }
}
