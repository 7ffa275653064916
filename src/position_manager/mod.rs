/// Background loop that prices every open position and fires exit rules,
/// grounded in `execution/position.rs` + `execution/risk.rs`'s periodic
/// price-refresh/exit-check shape; the exit-rule table itself follows
/// `original_source/trader/position_manager.py`'s `EXIT_RULES`.
use crate::error::AppResult;
use crate::market_data::MarketDataAdapter;
use crate::store::Store;
use crate::types::{Position, SourceType, TakeProfitLevel};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

pub struct ExitRules {
    pub tp_ladder: Vec<TakeProfitLevel>,
    pub sl_multiplier: f64,
    pub max_hold_hours: i64,
}

/// Defaults from the source-type exit table; not exposed via config
/// since they vary in shape (ladder length) per source type.
pub fn exit_rules_for(source_type: SourceType) -> ExitRules {
    match source_type {
        SourceType::Human => ExitRules {
            tp_ladder: vec![TakeProfitLevel::new(2.0, 0.50), TakeProfitLevel::new(4.0, 0.50), TakeProfitLevel::new(8.0, 1.00)],
            sl_multiplier: 0.6,
            max_hold_hours: 24,
        },
        SourceType::Bot => ExitRules {
            tp_ladder: vec![TakeProfitLevel::new(1.5, 0.50), TakeProfitLevel::new(2.5, 1.00)],
            sl_multiplier: 0.8,
            max_hold_hours: 2,
        },
        SourceType::Consensus => ExitRules {
            tp_ladder: vec![TakeProfitLevel::new(2.0, 0.33), TakeProfitLevel::new(5.0, 0.50), TakeProfitLevel::new(10.0, 1.00)],
            sl_multiplier: 0.7,
            max_hold_hours: 48,
        },
    }
}

/// Implemented by the Trade Executor; kept as a trait here so this module
/// doesn't need to depend on the executor crate module.
#[async_trait]
pub trait PositionSeller: Send + Sync {
    async fn sell(&self, position: &Position, fraction: f64, reason: &str) -> AppResult<()>;
}

pub struct PositionManager {
    store: Store,
    market_data: Arc<dyn MarketDataAdapter>,
    seller: Arc<dyn PositionSeller>,
    poll_interval_secs: u64,
}

impl PositionManager {
    pub fn new(store: Store, market_data: Arc<dyn MarketDataAdapter>, seller: Arc<dyn PositionSeller>, poll_interval_secs: u64) -> Self {
        Self { store, market_data, seller, poll_interval_secs }
    }

    pub async fn run(&self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.poll_interval_secs));
        loop {
            interval.tick().await;
            if let Err(e) = self.tick().await {
                error!(error = %e, "position manager tick failed");
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn tick(&self) -> AppResult<()> {
        let positions = self.store.get_open_positions().await?;
        for position in &positions {
            if let Err(e) = self.process_position(position).await {
                warn!(mint = %position.mint, error = %e, "position tick failed, skipping");
            }
        }
        Ok(())
    }

    async fn process_position(&self, position: &Position) -> AppResult<()> {
        let id = position.id.expect("open position always has an id");

        let Some(snapshot) = self.market_data.snapshot(&position.mint).await? else {
            debug!(mint = %position.mint, "no price data this tick, skipping");
            return Ok(());
        };

        let multiplier = if position.entry_price_usd > 0.0 { snapshot.price_usd / position.entry_price_usd } else { 1.0 };
        let unrealized = position.invested_native * (multiplier - 1.0);
        self.store.update_position_price(id, snapshot.price_usd, unrealized).await?;

        let rules = exit_rules_for(position.source_type);

        let held_hours = (Utc::now() - position.opened_at).num_seconds() as f64 / 3600.0;
        if held_hours >= rules.max_hold_hours as f64 {
            self.seller.sell(position, 1.0, "max_hold_time").await?;
            return Ok(());
        }

        if multiplier <= rules.sl_multiplier {
            self.seller.sell(position, 1.0, "stop_loss").await?;
            return Ok(());
        }

        for level in &position.take_profit_ladder {
            if !level.hit && multiplier >= level.multiplier {
                self.seller.sell(position, level.fraction, "take_profit").await?;
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_ladder_matches_table() {
        let rules = exit_rules_for(SourceType::Human);
        assert_eq!(rules.sl_multiplier, 0.6);
        assert_eq!(rules.max_hold_hours, 24);
        assert_eq!(rules.tp_ladder.len(), 3);
        assert_eq!(rules.tp_ladder[2].multiplier, 8.0);
    }

    #[test]
    fn bot_ladder_is_tighter_than_human() {
        let bot = exit_rules_for(SourceType::Bot);
        let human = exit_rules_for(SourceType::Human);
        assert!(bot.max_hold_hours < human.max_hold_hours);
        assert!(bot.sl_multiplier > human.sl_multiplier);
    }

    #[test]
    fn consensus_ladder_matches_table() {
        let rules = exit_rules_for(SourceType::Consensus);
        assert_eq!(rules.max_hold_hours, 48);
        assert_eq!(rules.tp_ladder[0].fraction, 0.33);
    }
}
