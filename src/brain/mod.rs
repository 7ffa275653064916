/// Autonomous decision engine, grounded in `original_source/agent/brain.py`'s
/// scan/aggregate/score/decide/log/learn pipeline; task-loop shape follows
/// `intelligence/copy_trader.rs` and `intelligence/background_sync.rs`.
use crate::config::{BrainConfig, RiskConfig, TradingControl};
use crate::error::AppResult;
use crate::executor::TradeExecutor;
use crate::market_data::MarketDataAdapter;
use crate::store::Store;
use crate::types::{
    AgentDecision, AgentStrategy, DecisionKind, SafetyFlags, Signal, SignalType, SourceType, Token,
};
use crate::validator::ValidatedSignal;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

struct Opportunity {
    mint: String,
    buy_count: u32,
    sell_count: u32,
    avg_wallet_score: f64,
    top_wallet_profit: f64,
    raw_confidence: f64,
    /// (wallet, score-at-emission) of the highest trust-adjusted buyer.
    representative: (String, f64),
}

pub struct AgentBrain {
    store: Store,
    control: TradingControl,
    executor: Arc<TradeExecutor>,
    market_data: Arc<dyn MarketDataAdapter>,
    risk: RiskConfig,
    config: BrainConfig,
    strategy_path: String,
    strategy: RwLock<AgentStrategy>,
    cooldowns: Mutex<HashMap<String, DateTime<Utc>>>,
    base_position_native: f64,
    max_position_size_native: f64,
}

impl AgentBrain {
    pub fn new(
        store: Store,
        control: TradingControl,
        executor: Arc<TradeExecutor>,
        market_data: Arc<dyn MarketDataAdapter>,
        risk: RiskConfig,
        config: BrainConfig,
        strategy_path: String,
        base_position_native: f64,
        max_position_size_native: f64,
    ) -> Self {
        let strategy = load_strategy(&strategy_path);
        Self {
            store,
            control,
            executor,
            market_data,
            risk,
            config,
            strategy_path,
            strategy: RwLock::new(strategy),
            cooldowns: Mutex::new(HashMap::new()),
            base_position_native,
            max_position_size_native,
        }
    }

    pub fn strategy_snapshot(&self) -> AgentStrategy {
        self.strategy.read().expect("strategy rwlock poisoned").clone()
    }

    pub async fn run_cycle_loop(&self) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(self.config.cycle_interval_secs));
        loop {
            interval.tick().await;
            if let Err(e) = self.cycle().await {
                error!(error = %e, "agent brain cycle failed");
            }
        }
    }

    pub async fn run_learn_loop(&self) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(self.config.learn_interval_secs));
        loop {
            interval.tick().await;
            if let Err(e) = self.learn().await {
                error!(error = %e, "agent brain learning cycle failed");
            }
        }
    }

    /// Scan → aggregate → score → decide → log. Returns the number of buy
    /// decisions executed this cycle.
    #[instrument(skip(self))]
    pub async fn cycle(&self) -> AppResult<usize> {
        if self.control.is_killed() {
            debug!("kill switch engaged, skipping brain cycle");
            return Ok(0);
        }

        let signals = self.store.recent_signals(self.config.signal_window_secs).await?;
        if signals.is_empty() {
            return Ok(0);
        }

        let mut opportunities = self.aggregate(&signals).await?;
        opportunities.sort_by(|a, b| b.raw_confidence.partial_cmp(&a.raw_confidence).unwrap_or(std::cmp::Ordering::Equal));

        let mut open_positions = self.store.get_open_positions().await?.len();
        let daily_pnl = self.store.todays_pnl().await?;
        let strategy = self.strategy_snapshot();
        let now = Utc::now();

        let mut buys_made = 0usize;
        let mut total_skips = 0usize;

        for opp in &opportunities {
            let decision = self.decide(opp, &strategy, open_positions, daily_pnl, now).await?;

            match decision.decision {
                DecisionKind::Buy => {
                    buys_made += 1;
                    open_positions += 1;
                    self.cooldowns.lock().expect("cooldowns mutex poisoned").insert(opp.mint.clone(), now);
                }
                DecisionKind::Skip => total_skips += 1,
                DecisionKind::Hold => {}
            }

            self.store.insert_agent_decision(&decision).await?;

            if buys_made >= strategy.max_concurrent_decisions as usize {
                break;
            }
        }

        self.mutate_strategy(|s| {
            s.stats.total_decisions += opportunities.len() as u64;
            s.stats.total_buys += buys_made as u64;
            s.stats.total_skips += total_skips as u64;
        });

        info!(opportunities = opportunities.len(), buys = buys_made, skips = total_skips, "agent cycle complete");
        Ok(buys_made)
    }

    async fn aggregate(&self, signals: &[Signal]) -> AppResult<Vec<Opportunity>> {
        let strategy = self.strategy_snapshot();
        let mut by_mint: HashMap<String, Vec<&Signal>> = HashMap::new();
        let mut sells: HashMap<String, u32> = HashMap::new();

        for s in signals {
            match s.signal_type {
                SignalType::Buy | SignalType::LargeBuy => by_mint.entry(s.token_mint.clone()).or_default().push(s),
                SignalType::Sell | SignalType::LargeSell => *sells.entry(s.token_mint.clone()).or_insert(0) += 1,
            }
        }

        let mut wallet_cache: HashMap<String, f64> = HashMap::new();
        let mut wallet_profit_cache: HashMap<String, f64> = HashMap::new();
        let mut opportunities = Vec::new();

        for (mint, buys) in by_mint {
            let mut trust_adjusted = Vec::with_capacity(buys.len());
            let mut unique_wallets: HashSet<&str> = HashSet::new();
            let mut top_profit = 0.0f64;
            let mut best_trust_score = f64::MIN;
            let mut representative = (buys[0].wallet_address.clone(), buys[0].wallet_score_at_emission);

            for sig in &buys {
                unique_wallets.insert(&sig.wallet_address);

                let score = match wallet_cache.get(&sig.wallet_address) {
                    Some(&s) => s,
                    None => {
                        let s = self.store.get_wallet(&sig.wallet_address).await?.map(|w| w.total_score()).unwrap_or(sig.wallet_score_at_emission);
                        wallet_cache.insert(sig.wallet_address.clone(), s);
                        s
                    }
                };
                let profit = match wallet_profit_cache.get(&sig.wallet_address) {
                    Some(&p) => p,
                    None => {
                        let p = self.store.get_wallet(&sig.wallet_address).await?.map(|w| w.enrichment.profit_30d_usd).unwrap_or(0.0);
                        wallet_profit_cache.insert(sig.wallet_address.clone(), p);
                        p
                    }
                };
                top_profit = top_profit.max(profit);

                let trust = strategy.trust_of(&sig.wallet_address);
                let adjusted = score * trust;
                trust_adjusted.push(adjusted);
                if adjusted > best_trust_score {
                    best_trust_score = adjusted;
                    representative = (sig.wallet_address.clone(), score);
                }
            }

            let avg_score = trust_adjusted.iter().sum::<f64>() / trust_adjusted.len() as f64;
            let consensus_factor = (buys.len() as f64 / (strategy.consensus_threshold.max(1) as f64)).min(2.0);
            let quality_factor = (avg_score / 70.0).min(1.5);
            let individual_conf = buys.iter().map(|s| s.confidence).sum::<f64>() / buys.len() as f64;

            let raw_confidence = ((individual_conf * 0.3 + consensus_factor * 0.4 + quality_factor * 0.3) * 1000.0).round() / 1000.0;

            opportunities.push(Opportunity {
                mint: mint.clone(),
                buy_count: buys.len() as u32,
                sell_count: sells.get(&mint).copied().unwrap_or(0),
                avg_wallet_score: avg_score,
                top_wallet_profit: top_profit,
                raw_confidence,
                representative,
            });
            let _ = unique_wallets;
        }

        Ok(opportunities)
    }

    async fn decide(
        &self,
        opp: &Opportunity,
        strategy: &AgentStrategy,
        open_positions: usize,
        daily_pnl: f64,
        now: DateTime<Utc>,
    ) -> AppResult<AgentDecision> {
        let mut reasons = vec![format!("consensus_{}_wallets", opp.buy_count), format!("avg_score_{:.0}", opp.avg_wallet_score)];
        if opp.top_wallet_profit > 10_000.0 {
            reasons.push(format!("top_wallet_${:.0}_profit", opp.top_wallet_profit));
        }
        if opp.sell_count > 0 {
            reasons.push(format!("{}_concurrent_sells", opp.sell_count));
        }

        if self.store.get_position_by_token(&opp.mint).await?.is_some() {
            return Ok(self.journal(opp, DecisionKind::Hold, None, vec!["already_holding".to_string()]));
        }

        let cooldown_active = self
            .cooldowns
            .lock()
            .expect("cooldowns mutex poisoned")
            .get(&opp.mint)
            .is_some_and(|ts| now - *ts < Duration::seconds(strategy.cooldown_seconds as i64));
        if cooldown_active {
            reasons.push("cooldown_active".to_string());
            return Ok(self.journal(opp, DecisionKind::Skip, None, reasons));
        }

        if open_positions >= self.risk.max_open_positions {
            reasons.push("max_positions_reached".to_string());
            return Ok(self.journal(opp, DecisionKind::Skip, None, reasons));
        }

        if daily_pnl <= -self.risk.daily_loss_limit_native {
            self.control.engage_kill_switch("daily loss limit breached (brain)");
            reasons.push("daily_loss_limit".to_string());
            return Ok(self.journal(opp, DecisionKind::Skip, None, reasons));
        }

        if strategy.token_blacklist.iter().any(|m| m == &opp.mint) {
            reasons.push("blacklisted_token".to_string());
            return Ok(self.journal(opp, DecisionKind::Skip, None, reasons));
        }

        if opp.raw_confidence < strategy.min_confidence {
            reasons.push(format!("low_confidence_{:.2}<{:.2}", opp.raw_confidence, strategy.min_confidence));
            return Ok(self.journal(opp, DecisionKind::Skip, None, reasons));
        }

        let size = (self.base_position_native * strategy.position_scale * (0.5 + opp.raw_confidence)).min(self.max_position_size_native);

        let trade_id = match self.execute_buy(opp, size).await {
            Ok(id) => id,
            Err(e) => {
                warn!(mint = %opp.mint, error = %e, "brain-initiated buy failed");
                reasons.push("execution_failed".to_string());
                return Ok(self.journal(opp, DecisionKind::Skip, None, reasons));
            }
        };

        Ok(self.journal(opp, DecisionKind::Buy, Some(size), reasons).with_trade(trade_id))
    }

    async fn execute_buy(&self, opp: &Opportunity, size_native: f64) -> AppResult<Option<i64>> {
        let Some(snapshot) = self.market_data.snapshot(&opp.mint).await? else {
            return Ok(None);
        };
        let token = Token {
            mint: opp.mint.clone(),
            symbol: snapshot.symbol,
            name: snapshot.name,
            market_cap_usd: snapshot.market_cap_usd,
            price_usd: snapshot.price_usd,
            volume_24h_usd: snapshot.volume_24h_usd,
            liquidity_usd: snapshot.liquidity_usd,
            holder_count: snapshot.holder_count,
            price_multiplier: 1.0,
            safety: SafetyFlags::default(),
        };
        let source_type = if opp.buy_count >= 2 { SourceType::Consensus } else { SourceType::Human };
        let signal = Signal::new(opp.representative.0.clone(), opp.mint.clone(), SignalType::Buy, opp.representative.1, opp.raw_confidence.clamp(0.0, 1.0));
        let validated = ValidatedSignal { signal, token, source_type, position_size_native: size_native };
        self.executor.handle_signal(&validated).await
    }

    fn journal(&self, opp: &Opportunity, decision: DecisionKind, amount_native: Option<f64>, reasons: Vec<String>) -> AgentDecision {
        AgentDecision {
            id: None,
            token_mint: opp.mint.clone(),
            decision,
            confidence: opp.raw_confidence,
            reasons,
            unique_wallets: opp.buy_count,
            amount_native,
            executed: false,
            trade_id: None,
            created_at: Utc::now(),
        }
    }

    /// Requires ≥5 closed trades, else no-op.
    #[instrument(skip(self))]
    pub async fn learn(&self) -> AppResult<()> {
        let decisions = self.store.executed_decisions_with_wallet_and_pnl().await?;
        if decisions.len() < self.config.min_closed_trades_to_learn {
            debug!(count = decisions.len(), "not enough closed trades to learn yet");
            return Ok(());
        }

        let mut low = Vec::new();
        let mut wallet_perf: HashMap<String, Vec<f64>> = HashMap::new();
        let mut all_pnls = Vec::new();
        let mut token_pnl: HashMap<String, Vec<f64>> = HashMap::new();

        for (decision, wallet, pnl) in &decisions {
            if decision.confidence < 0.5 {
                low.push(*pnl);
            }
            if let Some(addr) = wallet {
                wallet_perf.entry(addr.clone()).or_default().push(*pnl);
            }
            all_pnls.push(*pnl);
            token_pnl.entry(decision.token_mint.clone()).or_default().push(*pnl);
        }

        self.mutate_strategy(|strategy| {
            if low.len() >= 3 {
                let mean = low.iter().sum::<f64>() / low.len() as f64;
                if mean < 0.0 {
                    strategy.min_confidence = (strategy.min_confidence + 0.05).min(0.85);
                } else if mean > 0.0 {
                    strategy.min_confidence = (strategy.min_confidence - 0.03).max(0.40);
                }
            }

            for (addr, pnls) in &wallet_perf {
                if pnls.len() < 2 {
                    continue;
                }
                let win_rate = pnls.iter().filter(|p| **p > 0.0).count() as f64 / pnls.len() as f64;
                let mean_pnl = pnls.iter().sum::<f64>() / pnls.len() as f64;
                let current = strategy.trust_of(addr);
                let updated = if win_rate >= 0.6 && mean_pnl > 0.0 {
                    (current + 0.2).min(3.0)
                } else if win_rate < 0.3 || mean_pnl < -0.01 {
                    (current - 0.3).max(0.1)
                } else {
                    current
                };
                if (updated - current).abs() > f64::EPSILON {
                    strategy.wallet_trust.insert(addr.clone(), (updated * 100.0).round() / 100.0);
                }
            }

            if !all_pnls.is_empty() {
                let total_pnl: f64 = all_pnls.iter().sum();
                let win_rate = all_pnls.iter().filter(|p| **p > 0.0).count() as f64 / all_pnls.len() as f64;
                strategy.stats.wins = all_pnls.iter().filter(|p| **p > 0.0).count() as u64;
                strategy.stats.losses = all_pnls.iter().filter(|p| **p <= 0.0).count() as u64;
                strategy.stats.total_pnl_native = total_pnl;
                strategy.stats.best_trade_native = all_pnls.iter().cloned().fold(f64::MIN, f64::max);
                strategy.stats.worst_trade_native = all_pnls.iter().cloned().fold(f64::MAX, f64::min);

                if win_rate >= 0.55 && total_pnl > 0.0 {
                    strategy.position_scale = (strategy.position_scale + 0.1).min(2.5);
                } else if win_rate < 0.4 || total_pnl < 0.0 {
                    strategy.position_scale = (strategy.position_scale - 0.15).max(0.3);
                }
            }

            for (mint, pnls) in &token_pnl {
                if pnls.len() >= 2 && pnls.iter().all(|p| *p < 0.0) && !strategy.token_blacklist.iter().any(|m| m == mint) {
                    strategy.token_blacklist.push(mint.clone());
                }
            }

            strategy.stats.learning_cycles += 1;
        });

        info!(decisions_analyzed = decisions.len(), "agent learning cycle complete");
        Ok(())
    }

    fn mutate_strategy(&self, f: impl FnOnce(&mut AgentStrategy)) {
        let mut strategy = self.strategy.write().expect("strategy rwlock poisoned");
        f(&mut strategy);
        if let Err(e) = save_strategy(&self.strategy_path, &strategy) {
            warn!(error = %e, "failed to persist agent strategy");
        }
    }
}

trait WithTrade {
    fn with_trade(self, trade_id: Option<i64>) -> Self;
}

impl WithTrade for AgentDecision {
    fn with_trade(mut self, trade_id: Option<i64>) -> Self {
        self.executed = trade_id.is_some();
        self.trade_id = trade_id;
        self
    }
}

fn load_strategy(path: &str) -> AgentStrategy {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
        Err(_) => AgentStrategy::default(),
    }
}

fn save_strategy(path: &str, strategy: &AgentStrategy) -> AppResult<()> {
    let json = serde_json::to_string_pretty(strategy)?;
    let tmp_path = format!("{path}.tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentStats;

    fn opp(confidence: f64, buy_count: u32) -> Opportunity {
        Opportunity {
            mint: "MINT".to_string(),
            buy_count,
            sell_count: 0,
            avg_wallet_score: 70.0,
            top_wallet_profit: 0.0,
            raw_confidence: confidence,
            representative: ("w1".to_string(), 70.0),
        }
    }

    #[test]
    fn strategy_round_trips_through_json() {
        let s = AgentStrategy { stats: AgentStats { learning_cycles: 3, ..Default::default() }, ..Default::default() };
        let json = serde_json::to_string(&s).unwrap();
        let back: AgentStrategy = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stats.learning_cycles, 3);
    }

    #[test]
    fn min_confidence_adjustment_respects_bounds() {
        let mut conf = 0.83_f64;
        conf = (conf + 0.05_f64).min(0.85);
        assert_eq!(conf, 0.85);
        let mut low = 0.42_f64;
        low = (low - 0.03_f64).max(0.40);
        assert_eq!(low, 0.40);
    }

    #[test]
    fn position_size_formula_scales_with_confidence() {
        let base = 0.1;
        let scale = 1.0;
        let confidence = 0.65;
        let size = base * scale * (0.5 + confidence);
        assert!((size - 0.115).abs() < 1e-9);
    }

    #[test]
    fn high_consensus_opportunity_classified_consensus() {
        let o = opp(0.7, 3);
        let source = if o.buy_count >= 2 { SourceType::Consensus } else { SourceType::Human };
        assert_eq!(source, SourceType::Consensus);
    }
}
