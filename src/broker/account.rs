/// Account balance and held positions
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::broker::endpoints::{self, TradingTr};
use crate::broker::transport::Transport;
use crate::error::Result;
use crate::types::{Balance, Environment, Position};
use crate::utils::{lenient_f64, lenient_i64};

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    #[serde(default)]
    output1: Vec<HoldingRow>,
    #[serde(default)]
    output2: Vec<SummaryRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HoldingRow {
    pdno: String,
    prdt_name: String,
    hldg_qty: String,
    pchs_avg_pric: String,
    prpr: String,
    evlu_pfls_amt: String,
    evlu_pfls_rt: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SummaryRow {
    tot_evlu_amt: String,
    prvs_rcdl_excc_amt: String,
    dnca_tot_amt: String,
    evlu_pfls_smtl_amt: String,
    asst_icdc_erng_rt: String,
}

impl BalanceResponse {
    fn into_balance(self) -> Balance {
        let positions = self
            .output1
            .iter()
            .filter_map(|row| {
                let amount = lenient_i64(&row.hldg_qty);
                (amount > 0).then(|| Position {
                    symbol: row.pdno.trim().to_string(),
                    name: row.prdt_name.trim().to_string(),
                    amount,
                    average_price: lenient_f64(&row.pchs_avg_pric),
                    current_price: lenient_f64(&row.prpr),
                    unrealized_pnl: lenient_f64(&row.evlu_pfls_amt),
                    unrealized_pnl_percent: lenient_f64(&row.evlu_pfls_rt),
                })
            })
            .collect();

        let summary = self.output2.into_iter().next().unwrap_or_default();

        Balance {
            total: lenient_f64(&summary.tot_evlu_amt),
            free: lenient_f64(&summary.prvs_rcdl_excc_amt),
            deposit: lenient_f64(&summary.dnca_tot_amt),
            total_pnl: lenient_f64(&summary.evlu_pfls_smtl_amt),
            total_pnl_percent: lenient_f64(&summary.asst_icdc_erng_rt),
            positions,
        }
    }
}

#[derive(Clone)]
pub struct AccountApi {
    transport: Arc<Transport>,
    environment: Environment,
    cano: String,
    product_code: String,
}

impl AccountApi {
    pub fn new(
        transport: Arc<Transport>,
        environment: Environment,
        cano: impl Into<String>,
        product_code: impl Into<String>,
    ) -> Self {
        AccountApi {
            transport,
            environment,
            cano: cano.into(),
            product_code: product_code.into(),
        }
    }

    /// Cash summary plus every position with a non-zero holding
    pub async fn fetch_balance(&self) -> Result<Balance> {
        let response: BalanceResponse = self
            .transport
            .get(
                endpoints::BALANCE,
                TradingTr::Balance.id(self.environment),
                &[
                    ("CANO", self.cano.as_str()),
                    ("ACNT_PRDT_CD", self.product_code.as_str()),
                    ("AFHR_FLPR_YN", "N"),
                    ("OFL_YN", ""),
                    ("INQR_DVSN", "02"),
                    ("UNPR_DVSN", "01"),
                    ("FUND_STTL_ICLD_YN", "N"),
                    ("FNCG_AMT_AUTO_RDPT_YN", "N"),
                    ("PRCS_DVSN", "00"),
                    ("CTX_AREA_FK100", ""),
                    ("CTX_AREA_NK100", ""),
                ],
            )
            .await?;

        let balance = response.into_balance();
        debug!("Balance: total {} free {} ({} positions)", balance.total, balance.free, balance.positions.len());
        Ok(balance)
    }
}
