use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a wallet candidate was first surfaced from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WalletSource {
    Manual,
    Gmgn,
    Fomo,
    Cluster,
}

impl std::fmt::Display for WalletSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WalletSource::Manual => "manual",
            WalletSource::Gmgn => "gmgn",
            WalletSource::Fomo => "fomo",
            WalletSource::Cluster => "cluster",
        };
        write!(f, "{s}")
    }
}

/// The four 0-25 sub-scores that compose a wallet's `total_score`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct WalletSubScores {
    pub pnl_score: f64,
    pub win_rate_score: f64,
    pub timing_score: f64,
    pub consistency_score: f64,
}

impl WalletSubScores {
    /// `total_score`, clamped to [0, 100] and rounded to one decimal.
    ///
    /// Invariant (P1): `0 <= total_score <= 100` and the total agrees
    /// with the sum of sub-scores to within 0.1.
    pub fn total(&self) -> f64 {
        let sum = self.pnl_score + self.win_rate_score + self.timing_score + self.consistency_score;
        (sum.clamp(0.0, 100.0) * 10.0).round() / 10.0
    }
}

/// Raw aggregated trading stats behind the sub-scores.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct WalletStats {
    pub total_pnl_native: f64,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub avg_entry_rank: f64,
    pub unique_winning_tokens: u32,
}

/// Enrichment pulled from the external wallet-analytics provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct WalletEnrichment {
    pub profit_30d_usd: f64,
    pub sol_balance: f64,
    pub win_rate: Option<f64>,
    pub buys_30d: u32,
    pub sells_30d: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Wallet {
    pub address: String,
    pub scores: WalletSubScores,
    pub stats: WalletStats,
    pub enrichment: WalletEnrichment,
    pub tags: Vec<String>,
    pub is_flagged: bool,
    pub flag_reason: Option<String>,
    pub is_monitored: bool,
    pub source: WalletSource,
    pub first_seen_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub score_updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn total_score(&self) -> f64 {
        self.scores.total()
    }
}

/// An append-only observed (buy, sell) pair linking a wallet to a token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletTokenTrade {
    pub wallet_address: String,
    pub token_mint: String,
    pub buy_amount_native: f64,
    pub sell_amount_native: f64,
    pub pnl_native: f64,
    pub buy_price_usd: f64,
    pub sell_price_usd: f64,
    /// Ordinal position among all historical buyers of this mint (1 = earliest).
    pub entry_rank: u32,
    pub first_buy_at: DateTime<Utc>,
    pub last_sell_at: Option<DateTime<Utc>>,
}
