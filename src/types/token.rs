use serde::{Deserialize, Serialize};

/// A discovered token, identified by its mint address.
///
/// Created on first discovery, updated on every subsequent discovery
/// pass, never destroyed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Token {
    pub mint: String,
    pub symbol: String,
    pub name: String,
    pub market_cap_usd: f64,
    pub price_usd: f64,
    pub volume_24h_usd: f64,
    pub liquidity_usd: f64,
    pub holder_count: u64,
    /// current price / minimum observed price over the discovery lookback window
    pub price_multiplier: f64,
    pub safety: SafetyFlags,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct SafetyFlags {
    pub rug_ratio: f64,
    pub wash_trading: bool,
    pub bundler_rate: f64,
    pub mint_authority_renounced: bool,
}

impl Token {
    /// `true` iff this candidate passes the safety gates in spec §4.4 step 5.
    pub fn passes_safety(&self) -> bool {
        self.safety.rug_ratio <= 0.5 && !self.safety.wash_trading && self.safety.bundler_rate <= 0.3
    }

    pub fn liquidity_to_mcap_ratio(&self) -> f64 {
        if self.market_cap_usd <= 0.0 {
            0.0
        } else {
            self.liquidity_usd / self.market_cap_usd
        }
    }
}
