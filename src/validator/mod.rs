/// Gates a raw Monitor signal before it reaches the Executor, grounded in
/// `execution/risk.rs`'s ordered-checks style and `stalker/copy_trader.rs`'s
/// wallet-classification step.
use crate::config::{RiskConfig, TradingControl, ValidatorConfig};
use crate::error::AppResult;
use crate::market_data::MarketDataAdapter;
use crate::store::Store;
use crate::swap::SwapAdapter;
use crate::types::{AgentStrategy, SafetyFlags, Signal, SourceType, Token, Wallet};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument, warn};

const BOT_TAGS: &[&str] = &["sandwich_bot", "sniper_bot", "mev_bot", "copy_bot", "arb_bot"];

#[derive(Debug, Clone)]
pub struct ValidatedSignal {
    pub signal: Signal,
    pub token: Token,
    pub source_type: SourceType,
    pub position_size_native: f64,
}

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub should_trade: bool,
    pub validated: Option<ValidatedSignal>,
    pub skip_reason: Option<String>,
}

pub struct SignalValidator {
    store: Store,
    swap: Arc<dyn SwapAdapter>,
    market_data: Arc<dyn MarketDataAdapter>,
    control: TradingControl,
    config: ValidatorConfig,
    risk: RiskConfig,
    bot_speed_trades_per_day: f64,
    recent_buys: Mutex<HashMap<String, Vec<(String, DateTime<Utc>)>>>,
}

impl SignalValidator {
    pub fn new(
        store: Store,
        swap: Arc<dyn SwapAdapter>,
        market_data: Arc<dyn MarketDataAdapter>,
        control: TradingControl,
        config: ValidatorConfig,
        risk: RiskConfig,
        bot_speed_trades_per_day: f64,
    ) -> Self {
        Self {
            store,
            swap,
            market_data,
            control,
            config,
            risk,
            bot_speed_trades_per_day,
            recent_buys: Mutex::new(HashMap::new()),
        }
    }

    #[instrument(skip(self, signal, wallet, strategy), fields(mint = %signal.token_mint, wallet = %signal.wallet_address))]
    pub async fn validate(&self, signal: &Signal, wallet: &Wallet, strategy: &AgentStrategy) -> AppResult<ValidationOutcome> {
        if self.control.is_killed() {
            return Ok(Self::skip("kill switch engaged"));
        }
        if strategy.token_blacklist.iter().any(|m| m == &signal.token_mint) {
            return Ok(Self::skip("token blacklisted"));
        }

        let open_positions = self.store.get_open_positions().await?;
        if open_positions.len() >= self.risk.max_open_positions {
            return Ok(Self::skip("max open positions reached"));
        }

        let todays_pnl = self.store.todays_pnl().await?;
        if todays_pnl <= -self.risk.daily_loss_limit_native {
            self.control.engage_kill_switch("daily loss limit breached");
            return Ok(Self::skip("daily loss limit breached, kill switch engaged"));
        }

        if let Some(existing) = self.store.get_position_by_token(&signal.token_mint).await? {
            if existing.invested_native >= self.risk.per_token_cap_native {
                return Ok(Self::skip("per-token position cap reached"));
            }
        }

        let Some(snapshot) = self.market_data.snapshot(&signal.token_mint).await? else {
            return Ok(Self::skip("no market data available"));
        };
        if snapshot.liquidity_usd < self.config.min_liquidity_usd
            || snapshot.market_cap_usd < self.config.min_copy_trade_mcap_usd
            || snapshot.market_cap_usd > self.config.max_copy_trade_mcap_usd
        {
            return Ok(Self::skip("liquidity or market cap out of range"));
        }

        let can_sell = self.swap.can_sell(&signal.token_mint).await;
        if !can_sell.treat_as_sellable() {
            return Ok(Self::skip("honeypot probe failed: token cannot be sold"));
        }

        let unique_wallets = self.record_and_count_recent_buyers(&signal.token_mint, &wallet.address);

        let is_known_bot_tag = wallet.tags.iter().any(|t| BOT_TAGS.contains(&t.as_str()));
        let trades_per_day = wallet.enrichment.buys_30d as f64 / 30.0;
        let source_type = Self::classify_source_type(unique_wallets, is_known_bot_tag, trades_per_day, self.bot_speed_trades_per_day);

        let multiplier = match source_type {
            SourceType::Consensus => self.config.consensus_multiplier,
            SourceType::Bot => self.config.bot_multiplier,
            SourceType::Human => 1.0,
        };
        let position_size_native = Self::position_size(self.config.base_position_native, multiplier, self.config.max_position_size_native);

        debug!(?source_type, unique_wallets, position_size_native, "signal validated");

        let token = Token {
            mint: signal.token_mint.clone(),
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

        Ok(ValidationOutcome {
            should_trade: true,
            validated: Some(ValidatedSignal { signal: signal.clone(), token, source_type, position_size_native }),
            skip_reason: None,
        })
    }

    /// Records `wallet` as a recent buyer of `mint`, prunes entries outside
    /// the consensus window, and returns the resulting unique-buyer count.
    fn record_and_count_recent_buyers(&self, mint: &str, wallet: &str) -> usize {
        let mut map = self.recent_buys.lock().expect("recent_buys mutex poisoned");
        let now = Utc::now();
        let window = Duration::seconds(self.config.consensus_window_secs);
        let entry = map.entry(mint.to_string()).or_default();
        entry.retain(|(_, ts)| now - *ts <= window);
        if !entry.iter().any(|(w, _)| w == wallet) {
            entry.push((wallet.to_string(), now));
        }
        entry.len()
    }

    fn classify_source_type(unique_wallets: usize, is_known_bot_tag: bool, trades_per_day: f64, bot_speed_threshold: f64) -> SourceType {
        if unique_wallets >= 2 {
            SourceType::Consensus
        } else if is_known_bot_tag || trades_per_day >= bot_speed_threshold {
            SourceType::Bot
        } else {
            SourceType::Human
        }
    }

    fn position_size(base: f64, multiplier: f64, cap: f64) -> f64 {
        (base * multiplier).min(cap)
    }

    fn skip(reason: &str) -> ValidationOutcome {
        warn!(reason, "signal rejected");
        ValidationOutcome { should_trade: false, validated: None, skip_reason: Some(reason.to_string()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consensus_wins_over_bot_tag() {
        let s = SignalValidator::classify_source_type(2, true, 50.0, 20.0);
        assert_eq!(s, SourceType::Consensus);
    }

    #[test]
    fn bot_tag_alone_classifies_bot() {
        let s = SignalValidator::classify_source_type(1, true, 0.0, 20.0);
        assert_eq!(s, SourceType::Bot);
    }

    #[test]
    fn high_trade_speed_without_tag_classifies_bot() {
        let s = SignalValidator::classify_source_type(1, false, 25.0, 20.0);
        assert_eq!(s, SourceType::Bot);
    }

    #[test]
    fn default_classification_is_human() {
        let s = SignalValidator::classify_source_type(1, false, 2.0, 20.0);
        assert_eq!(s, SourceType::Human);
    }

    #[test]
    fn position_size_respects_cap() {
        assert_eq!(SignalValidator::position_size(1.0, 5.0, 3.0), 3.0);
        assert_eq!(SignalValidator::position_size(1.0, 2.0, 3.0), 2.0);
    }
}
