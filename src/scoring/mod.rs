/// Wallet scoring and the periodic refresh/promotion cycle, grounded in
/// `intelligence/insider_detector.rs`'s banded confidence math.
use crate::config::ScoringConfig;
use crate::error::AppResult;
use crate::store::Store;
use crate::types::{Wallet, WalletEnrichment, WalletSource, WalletStats, WalletSubScores, WalletTokenTrade};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tracing::{info, instrument};

const BOT_TAGS: &[&str] = &["sandwich_bot", "sniper_bot", "mev_bot", "copy_bot", "arb_bot"];

pub struct WalletScorer {
    store: Store,
    config: ScoringConfig,
}

impl WalletScorer {
    pub fn new(store: Store, config: ScoringConfig) -> Self {
        Self { store, config }
    }

    /// Scores one wallet from its aggregated trades plus provider
    /// enrichment, preserving `first_seen_at` across re-scores.
    #[instrument(skip(self, trades), fields(address = address))]
    pub async fn score_and_persist(
        &self,
        address: &str,
        trades: &[WalletTokenTrade],
        enrichment: WalletEnrichment,
        tags: Vec<String>,
        source: WalletSource,
    ) -> AppResult<Wallet> {
        let existing = self.store.get_wallet(address).await?;
        let now = Utc::now();

        let local_pnl: f64 = trades.iter().map(|t| t.pnl_native).sum();
        let total_trades_local = trades.len() as u32;
        let winning_trades_local = trades.iter().filter(|t| t.pnl_native > 0.0).count() as u32;

        let avg_entry_rank = if trades.is_empty() {
            500.0
        } else {
            trades.iter().map(|t| t.entry_rank as f64).sum::<f64>() / trades.len() as f64
        };

        let unique_winners = trades
            .iter()
            .filter(|t| t.pnl_native > 0.0)
            .map(|t| t.token_mint.as_str())
            .collect::<HashSet<_>>()
            .len() as u32;

        // Provider enrichment replaces local stats only when it's strictly
        // richer (spec §4.5): a nonzero 30d profit or an explicit win rate.
        let effective_pnl = if enrichment.profit_30d_usd > 0.0 {
            enrichment.profit_30d_usd / self.config.sol_usd_reference_rate
        } else {
            local_pnl
        };

        let effective_win_rate = match enrichment.win_rate {
            Some(wr) => wr.clamp(0.0, 1.0),
            None if total_trades_local > 0 => winning_trades_local as f64 / total_trades_local as f64,
            None => 0.0,
        };

        let mut effective_total_trades = total_trades_local;
        if enrichment.buys_30d > effective_total_trades && enrichment.buys_30d <= self.config.trade_count_cap {
            effective_total_trades = enrichment.buys_30d;
        }

        let scores = WalletSubScores {
            pnl_score: Self::score_pnl(effective_pnl),
            win_rate_score: Self::score_win_rate(effective_win_rate, effective_total_trades),
            timing_score: Self::score_timing(avg_entry_rank),
            consistency_score: Self::score_consistency(unique_winners),
        };

        let stats = WalletStats {
            total_pnl_native: effective_pnl,
            total_trades: effective_total_trades,
            winning_trades: winning_trades_local,
            avg_entry_rank,
            unique_winning_tokens: unique_winners,
        };

        let wallet = Wallet {
            address: address.to_string(),
            scores,
            stats,
            enrichment,
            tags,
            is_flagged: existing.as_ref().map(|w| w.is_flagged).unwrap_or(false),
            flag_reason: existing.as_ref().and_then(|w| w.flag_reason.clone()),
            is_monitored: existing.as_ref().map(|w| w.is_monitored).unwrap_or(false),
            source,
            first_seen_at: existing.as_ref().map(|w| w.first_seen_at).unwrap_or(now),
            last_active_at: now,
            score_updated_at: now,
        };

        self.store.upsert_wallet(&wallet).await?;
        Ok(wallet)
    }

    /// Scores a batch, persists each, and logs the leaderboard. Returns
    /// wallets sorted by `total_score` descending.
    pub async fn score_batch(
        &self,
        wallet_data: HashMap<String, (Vec<WalletTokenTrade>, WalletEnrichment, Vec<String>, WalletSource)>,
    ) -> AppResult<Vec<Wallet>> {
        let mut scored = Vec::with_capacity(wallet_data.len());
        for (address, (trades, enrichment, tags, source)) in wallet_data {
            let wallet = self.score_and_persist(&address, &trades, enrichment, tags, source).await?;
            scored.push(wallet);
        }
        scored.sort_by(|a, b| b.total_score().partial_cmp(&a.total_score()).unwrap_or(std::cmp::Ordering::Equal));
        self.log_leaderboard(&scored);
        Ok(scored)
    }

    fn log_leaderboard(&self, wallets: &[Wallet]) {
        for (i, w) in wallets.iter().take(20).enumerate() {
            info!(
                rank = i + 1,
                address = %w.address,
                total_score = w.total_score(),
                pnl_native = w.stats.total_pnl_native,
                win_rate = format!("{}/{}", w.stats.winning_trades, w.stats.total_trades),
                avg_entry_rank = w.stats.avg_entry_rank,
                unique_winners = w.stats.unique_winning_tokens,
                "leaderboard"
            );
        }
    }

    fn score_pnl(effective_pnl_native: f64) -> f64 {
        if effective_pnl_native <= 0.0 {
            0.0
        } else if effective_pnl_native >= 100.0 {
            25.0
        } else if effective_pnl_native >= 50.0 {
            22.0
        } else if effective_pnl_native >= 20.0 {
            18.0
        } else if effective_pnl_native >= 10.0 {
            15.0
        } else if effective_pnl_native >= 5.0 {
            12.0
        } else if effective_pnl_native >= 1.0 {
            8.0
        } else {
            3.0
        }
    }

    fn score_win_rate(win_rate: f64, total_trades: u32) -> f64 {
        if total_trades < 3 {
            return if total_trades >= 2 && win_rate > 0.5 { 10.0 } else { 5.0 };
        }
        if win_rate >= 0.8 {
            25.0
        } else if win_rate >= 0.7 {
            20.0
        } else if win_rate >= 0.6 {
            15.0
        } else if win_rate >= 0.5 {
            10.0
        } else {
            5.0
        }
    }

    fn score_timing(avg_entry_rank: f64) -> f64 {
        if avg_entry_rank <= 50.0 {
            25.0
        } else if avg_entry_rank <= 100.0 {
            22.0
        } else if avg_entry_rank <= 200.0 {
            18.0
        } else if avg_entry_rank <= 500.0 {
            12.0
        } else if avg_entry_rank <= 1000.0 {
            8.0
        } else {
            3.0
        }
    }

    fn score_consistency(unique_winners: u32) -> f64 {
        if unique_winners >= 10 {
            25.0
        } else if unique_winners >= 7 {
            22.0
        } else if unique_winners >= 5 {
            18.0
        } else if unique_winners >= 3 {
            14.0
        } else if unique_winners >= 2 {
            10.0
        } else {
            5.0
        }
    }
}

pub struct RefreshSummary {
    pub scanned: usize,
    pub monitored: usize,
    pub promoted: Vec<String>,
    pub demoted: Vec<String>,
    pub bot_speed_count: usize,
}

/// Periodic re-rank across the whole wallet pool: tags bot-speed wallets,
/// computes a composite score independent of the four banded sub-scores,
/// and promotes the top N to monitored.
pub struct WalletRefresher {
    store: Store,
    config: ScoringConfig,
}

impl WalletRefresher {
    pub fn new(store: Store, config: ScoringConfig) -> Self {
        Self { store, config }
    }

    #[instrument(skip(self))]
    pub async fn refresh(&self) -> AppResult<RefreshSummary> {
        let wallets = self.store.all_wallets().await?;
        let copy_perf = self.store.copy_performance_by_wallet().await?;

        let mut ranked: Vec<(f64, Wallet, bool)> = wallets
            .into_iter()
            .map(|w| {
                let is_bot = Self::is_bot_speed(&w, &self.config);
                let score = self.composite_score(&w, is_bot, &copy_perf);
                (score, w, is_bot)
            })
            .collect();
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let top_n = self.config.top_n_monitored;
        let bot_speed_count = ranked.iter().filter(|(_, _, is_bot)| *is_bot).count();

        let mut promoted = Vec::new();
        let mut demoted = Vec::new();
        for (i, (_, w, _)) in ranked.iter().enumerate() {
            let should_monitor = i < top_n;
            if should_monitor != w.is_monitored {
                self.store.set_wallet_monitored(&w.address, should_monitor).await?;
                if should_monitor {
                    promoted.push(w.address.clone());
                } else {
                    demoted.push(w.address.clone());
                }
            }
        }

        let summary = RefreshSummary {
            scanned: ranked.len(),
            monitored: ranked.len().min(top_n),
            promoted,
            demoted,
            bot_speed_count,
        };
        info!(
            scanned = summary.scanned,
            monitored = summary.monitored,
            promoted = summary.promoted.len(),
            demoted = summary.demoted.len(),
            bots = summary.bot_speed_count,
            "wallet refresh complete"
        );
        Ok(summary)
    }

    fn is_bot_speed(w: &Wallet, cfg: &ScoringConfig) -> bool {
        if w.tags.iter().any(|t| BOT_TAGS.contains(&t.as_str())) {
            return true;
        }
        let trades_per_day = (w.enrichment.buys_30d + w.enrichment.sells_30d) as f64 / 30.0;
        trades_per_day >= cfg.bot_speed_trades_per_day
    }

    fn composite_score(&self, w: &Wallet, is_bot: bool, copy_perf: &HashMap<String, f64>) -> f64 {
        let profit_score = ((w.enrichment.profit_30d_usd.max(0.0) + 1.0).log10() * 8.0).clamp(0.0, 40.0);
        let winrate_score = w.enrichment.win_rate.unwrap_or(0.0).clamp(0.0, 1.0) * 25.0;
        let trades_30d = (w.enrichment.buys_30d + w.enrichment.sells_30d) as f64;
        let consistency_score = (trades_30d / 100.0).min(1.0) * 20.0;
        let balance_score = if w.enrichment.sol_balance > 5.0 {
            10.0
        } else if w.enrichment.sol_balance > 0.0 {
            5.0
        } else {
            0.0
        };
        let bot_penalty = if is_bot { -10.0 } else { 0.0 };
        let copy_bonus = match copy_perf.get(&w.address) {
            Some(pnl) if *pnl > 0.0 => 5.0,
            Some(pnl) if *pnl < 0.0 => -5.0,
            _ => 0.0,
        };
        (profit_score + winrate_score + consistency_score + balance_score + bot_penalty + copy_bonus).clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pnl_bands() {
        assert_eq!(WalletScorer::score_pnl(0.0), 0.0);
        assert_eq!(WalletScorer::score_pnl(0.5), 3.0);
        assert_eq!(WalletScorer::score_pnl(1.0), 8.0);
        assert_eq!(WalletScorer::score_pnl(5.0), 12.0);
        assert_eq!(WalletScorer::score_pnl(10.0), 15.0);
        assert_eq!(WalletScorer::score_pnl(20.0), 18.0);
        assert_eq!(WalletScorer::score_pnl(50.0), 22.0);
        assert_eq!(WalletScorer::score_pnl(100.0), 25.0);
        assert_eq!(WalletScorer::score_pnl(1000.0), 25.0);
    }

    #[test]
    fn win_rate_requires_sample_size() {
        assert_eq!(WalletScorer::score_win_rate(1.0, 1), 5.0);
        assert_eq!(WalletScorer::score_win_rate(0.6, 2), 10.0);
        assert_eq!(WalletScorer::score_win_rate(0.4, 2), 5.0);
        assert_eq!(WalletScorer::score_win_rate(0.85, 3), 25.0);
        assert_eq!(WalletScorer::score_win_rate(0.3, 10), 5.0);
    }

    #[test]
    fn timing_bands() {
        assert_eq!(WalletScorer::score_timing(50.0), 25.0);
        assert_eq!(WalletScorer::score_timing(100.0), 22.0);
        assert_eq!(WalletScorer::score_timing(200.0), 18.0);
        assert_eq!(WalletScorer::score_timing(500.0), 12.0);
        assert_eq!(WalletScorer::score_timing(1000.0), 8.0);
        assert_eq!(WalletScorer::score_timing(5000.0), 3.0);
    }

    #[test]
    fn consistency_bands() {
        assert_eq!(WalletScorer::score_consistency(0), 5.0);
        assert_eq!(WalletScorer::score_consistency(2), 10.0);
        assert_eq!(WalletScorer::score_consistency(3), 14.0);
        assert_eq!(WalletScorer::score_consistency(5), 18.0);
        assert_eq!(WalletScorer::score_consistency(7), 22.0);
        assert_eq!(WalletScorer::score_consistency(10), 25.0);
    }

    #[tokio::test]
    async fn score_and_persist_preserves_first_seen_at() {
        let store = Store::connect_in_memory().await;
        let config = ScoringConfig {
            trade_count_cap: 15_000,
            sol_usd_reference_rate: 150.0,
            top_n_monitored: 50,
            bot_speed_trades_per_day: 20.0,
        };
        let scorer = WalletScorer::new(store.clone(), config);

        let enrichment = WalletEnrichment::default();
        let first = scorer
            .score_and_persist("wallet1", &[], enrichment, vec![], WalletSource::Manual)
            .await
            .unwrap();

        let second = scorer
            .score_and_persist("wallet1", &[], WalletEnrichment::default(), vec![], WalletSource::Manual)
            .await
            .unwrap();

        assert_eq!(first.first_seen_at, second.first_seen_at);
    }
}
