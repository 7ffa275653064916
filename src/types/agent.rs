use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Buy,
    Skip,
    Hold,
}

/// One append-only row in the agent's decision journal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentDecision {
    pub id: Option<i64>,
    pub token_mint: String,
    pub decision: DecisionKind,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub unique_wallets: u32,
    pub amount_native: Option<f64>,
    pub executed: bool,
    pub trade_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Persisted, single-row learned strategy. Lives in a JSON file next to
/// the database, not in the relational store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentStrategy {
    pub version: u32,
    pub min_confidence: f64,
    pub consensus_threshold: u32,
    pub position_scale: f64,
    pub max_concurrent_decisions: u32,
    pub cooldown_seconds: u64,
    pub wallet_trust: HashMap<String, f64>,
    pub token_blacklist: Vec<String>,
    pub preferred_mcap_range: (f64, f64),
    pub preferred_liquidity_min: f64,
    pub stats: AgentStats,
    /// Unknown keys from a newer/older version are preserved verbatim
    /// but never read by this build, per the merge-with-defaults invariant.
    #[serde(flatten)]
    pub unknown: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct AgentStats {
    pub total_decisions: u64,
    pub total_buys: u64,
    pub total_skips: u64,
    pub wins: u64,
    pub losses: u64,
    pub total_pnl_native: f64,
    pub best_trade_native: f64,
    pub worst_trade_native: f64,
    pub learning_cycles: u64,
}

impl Default for AgentStrategy {
    fn default() -> Self {
        Self {
            version: 1,
            min_confidence: 0.6,
            consensus_threshold: 2,
            position_scale: 1.0,
            max_concurrent_decisions: 5,
            cooldown_seconds: 300,
            wallet_trust: HashMap::new(),
            token_blacklist: Vec::new(),
            preferred_mcap_range: (50_000.0, 10_000_000.0),
            preferred_liquidity_min: 10_000.0,
            stats: AgentStats::default(),
            unknown: HashMap::new(),
        }
    }
}

impl AgentStrategy {
    /// Per-wallet trust multiplier, defaulting to neutral (1.0) for wallets
    /// the learning loop has never adjusted.
    pub fn trust_of(&self, wallet: &str) -> f64 {
        self.wallet_trust.get(wallet).copied().unwrap_or(1.0)
    }

    /// A small human-readable snapshot used by the periodic status line
    /// (original_source's `get_strategy_summary`).
    pub fn summary(&self) -> String {
        let trusted = self
            .wallet_trust
            .iter()
            .filter(|(_, &t)| (t - 1.0).abs() > f64::EPSILON)
            .count();
        format!(
            "min_confidence={:.2} position_scale={:.2} consensus_threshold={} blacklist={} trusted_wallets_adjusted={} learning_cycles={}",
            self.min_confidence,
            self.position_scale,
            self.consensus_threshold,
            self.token_blacklist.len(),
            trusted,
            self.stats.learning_cycles,
        )
    }
}

/// One row per calendar day, recomputed idempotently.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct DailyStats {
    pub trades_executed: u32,
    pub positions_opened: u32,
    pub positions_closed: u32,
    pub realized_pnl_native: f64,
    pub best_trade_native: f64,
    pub worst_trade_native: f64,
    pub max_drawdown_native: f64,
    pub hit_daily_loss_limit: bool,
}
