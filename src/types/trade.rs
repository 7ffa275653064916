use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Pending,
    Confirmed,
    Unconfirmed,
    Failed,
    DryRun,
}

impl TradeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TradeStatus::Confirmed | TradeStatus::Unconfirmed | TradeStatus::Failed | TradeStatus::DryRun
        )
    }
}

/// A record of an attempted buy or sell. Created on submit, terminal on
/// confirm/fail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trade {
    pub id: Option<i64>,
    pub token_mint: String,
    pub side: TradeSide,
    pub amount_native: f64,
    pub amount_tokens: f64,
    pub price_usd: f64,
    pub triggering_wallet: Option<String>,
    pub signal_id: Option<i64>,
    pub sell_reason: Option<String>,
    pub tx_handle: Option<String>,
    pub status: TradeStatus,
    pub slippage_bps: Option<u32>,
    pub priority_fee_native: Option<f64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Trade {
    pub fn new_pending(token_mint: impl Into<String>, side: TradeSide, amount_native: f64) -> Self {
        Self {
            id: None,
            token_mint: token_mint.into(),
            side,
            amount_native,
            amount_tokens: 0.0,
            price_usd: 0.0,
            triggering_wallet: None,
            signal_id: None,
            sell_reason: None,
            tx_handle: None,
            status: TradeStatus::Pending,
            slippage_bps: None,
            priority_fee_native: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }
}
