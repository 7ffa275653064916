use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SourceType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// One rung of a take-profit ladder. Append-immutable: only `hit` flips.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TakeProfitLevel {
    pub multiplier: f64,
    /// Fraction of the *remaining* position to sell when this level triggers.
    pub fraction: f64,
    pub hit: bool,
}

impl TakeProfitLevel {
    pub fn new(multiplier: f64, fraction: f64) -> Self {
        Self { multiplier, fraction, hit: false }
    }
}

/// Open exposure to a token. At most one open position per mint (P2).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub id: Option<i64>,
    pub mint: String,
    pub entry_price_usd: f64,
    pub current_price_usd: f64,
    pub invested_native: f64,
    pub tokens_held: f64,
    pub take_profit_ladder: Vec<TakeProfitLevel>,
    pub stop_loss_price_usd: f64,
    pub triggering_wallet: Option<String>,
    pub status: PositionStatus,
    pub close_reason: Option<String>,
    pub realized_pnl_native: f64,
    pub unrealized_pnl_native: f64,
    pub source_type: SourceType,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub last_checked_at: DateTime<Utc>,
}

impl Position {
    pub fn multiplier(&self) -> f64 {
        if self.entry_price_usd <= 0.0 {
            1.0
        } else {
            self.current_price_usd / self.entry_price_usd
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }
}
