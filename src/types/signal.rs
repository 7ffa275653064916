use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Buy,
    Sell,
    LargeBuy,
    LargeSell,
}

/// An observed buy (or sell) by a monitored wallet, emitted by the Monitor
/// and resolved by the Validator/Executor as either executed or skipped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub id: Option<i64>,
    pub wallet_address: String,
    pub token_mint: String,
    pub signal_type: SignalType,
    pub wallet_score_at_emission: f64,
    /// Invariant (P5): always in [0.5, 1.0] for signals emitted by the Monitor.
    pub confidence: f64,
    pub executed: bool,
    pub trade_id: Option<i64>,
    pub skip_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(
        wallet_address: impl Into<String>,
        token_mint: impl Into<String>,
        signal_type: SignalType,
        wallet_score_at_emission: f64,
        confidence: f64,
    ) -> Self {
        Self {
            id: None,
            wallet_address: wallet_address.into(),
            token_mint: token_mint.into(),
            signal_type,
            wallet_score_at_emission,
            confidence,
            executed: false,
            trade_id: None,
            skip_reason: None,
            created_at: Utc::now(),
        }
    }
}
