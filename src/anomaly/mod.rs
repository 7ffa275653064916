/// Flags wallets whose trading pattern looks like a bot, insider, or
/// scammer rather than organic smart money, grounded in
/// `intelligence/insider_detector.rs`'s status-classification style.
use crate::types::{Wallet, WalletTokenTrade};
use std::collections::HashMap;

const BAD_TAGS: &[&str] = &["sandwich_bot", "scammer", "rug_deployer"];

pub struct AnomalyFlagger;

impl AnomalyFlagger {
    pub fn new() -> Self {
        Self
    }

    /// Runs the five checks in order and joins every reason that fired.
    /// `None` means the wallet looks clean.
    pub fn check(&self, wallet: &Wallet, trades: &[WalletTokenTrade]) -> Option<String> {
        let mut reasons = Vec::new();

        if let Some(r) = Self::check_tags(wallet) {
            reasons.push(r);
        }
        if let Some(r) = Self::check_win_rate(wallet) {
            reasons.push(r);
        }
        if let Some(r) = Self::check_timing(wallet) {
            reasons.push(r);
        }
        if let Some(r) = Self::check_trade_size_uniformity(trades) {
            reasons.push(r);
        }
        if let Some(r) = Self::check_frequency(trades) {
            reasons.push(r);
        }

        if reasons.is_empty() {
            None
        } else {
            Some(reasons.join("; "))
        }
    }

    fn check_tags(wallet: &Wallet) -> Option<String> {
        let hits: Vec<&str> = wallet.tags.iter().map(|t| t.as_str()).filter(|t| BAD_TAGS.contains(t)).collect();
        if hits.is_empty() {
            None
        } else {
            Some(format!("tagged: {}", hits.join(",")))
        }
    }

    fn check_win_rate(wallet: &Wallet) -> Option<String> {
        let total = wallet.stats.total_trades;
        if total < 5 {
            return None;
        }
        let win_rate = wallet.stats.winning_trades as f64 / total as f64;
        if win_rate >= 0.95 {
            Some(format!("win rate {:.0}% over {total} trades", win_rate * 100.0))
        } else {
            None
        }
    }

    fn check_timing(wallet: &Wallet) -> Option<String> {
        let avg_rank = wallet.stats.avg_entry_rank;
        let unique_winners = wallet.stats.unique_winning_tokens;
        if avg_rank <= 10.0 && unique_winners >= 3 {
            Some(format!("sniper pattern: avg entry rank {avg_rank:.0} across {unique_winners} tokens"))
        } else if avg_rank <= 5.0 && unique_winners >= 2 {
            Some(format!("sniper pattern: avg entry rank {avg_rank:.0} across {unique_winners} tokens"))
        } else {
            None
        }
    }

    fn check_trade_size_uniformity(trades: &[WalletTokenTrade]) -> Option<String> {
        let amounts: Vec<i64> = trades
            .iter()
            .filter(|t| t.buy_amount_native > 0.0)
            .map(|t| (t.buy_amount_native * 10_000.0).round() as i64)
            .collect();
        if amounts.len() < 3 {
            return None;
        }

        let mut counts: HashMap<i64, usize> = HashMap::new();
        for a in &amounts {
            *counts.entry(*a).or_insert(0) += 1;
        }
        let (most_common, count) = counts.into_iter().max_by_key(|(_, c)| *c)?;
        if count as f64 / amounts.len() as f64 >= 0.8 {
            Some(format!("uniform trade size: {count}/{} at {:.4} SOL", amounts.len(), most_common as f64 / 10_000.0))
        } else {
            None
        }
    }

    fn check_frequency(trades: &[WalletTokenTrade]) -> Option<String> {
        if trades.len() >= 20 {
            Some(format!("high frequency: {} trades in sample", trades.len()))
        } else {
            None
        }
    }
}

impl Default for AnomalyFlagger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{WalletEnrichment, WalletSource, WalletStats, WalletSubScores};
    use chrono::Utc;

    fn wallet(stats: WalletStats, tags: Vec<String>) -> Wallet {
        let now = Utc::now();
        Wallet {
            address: "w1".to_string(),
            scores: WalletSubScores::default(),
            stats,
            enrichment: WalletEnrichment::default(),
            tags,
            is_flagged: false,
            flag_reason: None,
            is_monitored: false,
            source: WalletSource::Manual,
            first_seen_at: now,
            last_active_at: now,
            score_updated_at: now,
        }
    }

    #[test]
    fn flags_bad_tags() {
        let w = wallet(WalletStats::default(), vec!["sandwich_bot".to_string()]);
        let flagger = AnomalyFlagger::new();
        assert!(flagger.check(&w, &[]).unwrap().contains("tagged"));
    }

    #[test]
    fn flags_ceiling_win_rate_with_enough_trades() {
        let stats = WalletStats { total_trades: 10, winning_trades: 10, ..Default::default() };
        let w = wallet(stats, vec![]);
        assert!(AnomalyFlagger::new().check(&w, &[]).is_some());
    }

    #[test]
    fn does_not_flag_high_win_rate_with_too_few_trades() {
        let stats = WalletStats { total_trades: 4, winning_trades: 4, ..Default::default() };
        let w = wallet(stats, vec![]);
        assert!(AnomalyFlagger::new().check(&w, &[]).is_none());
    }

    #[test]
    fn flags_sniper_timing() {
        let stats = WalletStats { avg_entry_rank: 8.0, unique_winning_tokens: 3, ..Default::default() };
        let w = wallet(stats, vec![]);
        assert!(AnomalyFlagger::new().check(&w, &[]).unwrap().contains("sniper"));
    }

    #[test]
    fn flags_uniform_trade_sizes() {
        let mut trades = Vec::new();
        for _ in 0..4 {
            trades.push(WalletTokenTrade {
                wallet_address: "w1".to_string(),
                token_mint: "m".to_string(),
                buy_amount_native: 1.0,
                sell_amount_native: 0.0,
                pnl_native: 0.0,
                buy_price_usd: 0.0,
                sell_price_usd: 0.0,
                entry_rank: 100,
                first_buy_at: Utc::now(),
                last_sell_at: None,
            });
        }
        let w = wallet(WalletStats::default(), vec![]);
        assert!(AnomalyFlagger::new().check(&w, &trades).unwrap().contains("uniform"));
    }

    #[test]
    fn flags_high_frequency() {
        let mut trades = Vec::new();
        for i in 0..20 {
            trades.push(WalletTokenTrade {
                wallet_address: "w1".to_string(),
                token_mint: format!("m{i}"),
                buy_amount_native: 1.0 + i as f64 * 0.1,
                sell_amount_native: 0.0,
                pnl_native: 0.0,
                buy_price_usd: 0.0,
                sell_price_usd: 0.0,
                entry_rank: 100,
                first_buy_at: Utc::now(),
                last_sell_at: None,
            });
        }
        let w = wallet(WalletStats::default(), vec![]);
        assert!(AnomalyFlagger::new().check(&w, &trades).unwrap().contains("high frequency"));
    }

    #[test]
    fn clean_wallet_is_not_flagged() {
        let stats = WalletStats { total_trades: 10, winning_trades: 6, avg_entry_rank: 300.0, unique_winning_tokens: 4 };
        let w = wallet(stats, vec![]);
        assert!(AnomalyFlagger::new().check(&w, &[]).is_none());
    }
}
