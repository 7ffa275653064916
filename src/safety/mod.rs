/// Hard limits enforced immediately before and after every trade,
/// independent of and redundant with the Validator's gates, grounded in
/// `original_source/trader/safety_rails.py` (`execution/risk.rs` carries
/// the equivalent concern in this codebase but as inline checks rather
/// than a standalone component).
use crate::config::{RiskConfig, TradingControl};
use crate::error::AppResult;
use crate::store::Store;
use crate::types::{Mode, Signal};
use tracing::warn;

pub struct SafetyRails {
    store: Store,
    control: TradingControl,
    risk: RiskConfig,
    base_position_native: f64,
    max_position_size_native: f64,
}

impl SafetyRails {
    pub fn new(store: Store, control: TradingControl, risk: RiskConfig, base_position_native: f64, max_position_size_native: f64) -> Self {
        Self { store, control, risk, base_position_native, max_position_size_native }
    }

    /// Checks run in order; the first failure short-circuits the rest.
    pub async fn pre_trade_check(&self, signal: &Signal, balance_native: f64) -> AppResult<(bool, String)> {
        if self.control.is_killed() {
            return Ok((false, "kill switch is active — all trading paused".to_string()));
        }
        if self.control.mode() != Mode::Live {
            return Ok((false, "not in live mode".to_string()));
        }

        let daily_pnl = self.store.todays_pnl().await?;
        if daily_pnl <= -self.risk.daily_loss_limit_native {
            self.control.engage_kill_switch("daily loss limit breached");
            warn!(daily_pnl, limit = -self.risk.daily_loss_limit_native, "daily loss limit hit");
            return Ok((false, format!("daily loss limit reached: {daily_pnl:.4} native")));
        }

        let open_positions = self.store.get_open_positions().await?;
        if open_positions.len() >= self.risk.max_open_positions {
            return Ok((false, format!("max positions reached: {}/{}", open_positions.len(), self.risk.max_open_positions)));
        }

        if let Some(existing) = self.store.get_position_by_token(&signal.token_mint).await? {
            if existing.invested_native >= self.risk.per_token_cap_native {
                return Ok((false, format!("max position size for this token: {:.4} native", existing.invested_native)));
            }
        }

        let min_balance = self.base_position_native + 0.01;
        if balance_native < min_balance {
            return Ok((false, format!("insufficient balance: {balance_native:.4} (need {min_balance:.4})")));
        }

        Ok((true, String::new()))
    }

    /// `size = min(base, 0.5*balance)`, scaled down further for middling
    /// confidence, floored at 0.001 native, rounded to 6 decimal places.
    pub fn calculate_position_size(&self, confidence: f64, balance_native: f64) -> f64 {
        let max_from_balance = balance_native * 0.5;
        let mut size = self.base_position_native.min(max_from_balance);

        if confidence >= 0.8 {
            size = size.min(self.max_position_size_native);
        } else if confidence >= 0.6 {
            size = (size * 0.8).min(self.max_position_size_native);
        }
        size = size.min(self.max_position_size_native);
        size = size.max(0.001);

        (size * 1_000_000.0).round() / 1_000_000.0
    }

    /// Recomputes daily stats and re-engages the kill switch if the day's
    /// realized PnL has since crossed the loss limit.
    pub async fn post_trade_check(&self) -> AppResult<()> {
        let daily_pnl = self.store.todays_pnl().await?;
        if daily_pnl <= -self.risk.daily_loss_limit_native {
            self.control.engage_kill_switch("daily loss limit breached (post-trade)");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TradingControl;
    use crate::store::Store;
    use crate::types::{Mode, SignalType};

    fn risk() -> RiskConfig {
        RiskConfig { daily_loss_limit_native: 5.0, max_open_positions: 10, per_token_cap_native: 2.0, balance_floor_native: 0.05 }
    }

    async fn rails(mode: Mode) -> SafetyRails {
        let store = Store::connect_in_memory().await;
        let control = TradingControl::new(mode);
        SafetyRails::new(store, control, risk(), 0.5, 1.0)
    }

    #[tokio::test]
    async fn rejects_when_killed() {
        let r = rails(Mode::Live).await;
        r.control.engage_kill_switch("test");
        let signal = Signal::new("w1", "m1", SignalType::Buy, 50.0, 0.8);
        let (allowed, reason) = r.pre_trade_check(&signal, 10.0).await.unwrap();
        assert!(!allowed);
        assert!(reason.contains("kill switch"));
    }

    #[tokio::test]
    async fn rejects_when_not_live() {
        let r = rails(Mode::DryRun).await;
        let signal = Signal::new("w1", "m1", SignalType::Buy, 50.0, 0.8);
        let (allowed, reason) = r.pre_trade_check(&signal, 10.0).await.unwrap();
        assert!(!allowed);
        assert!(reason.contains("live mode"));
    }

    #[tokio::test]
    async fn rejects_low_balance() {
        let r = rails(Mode::Live).await;
        let signal = Signal::new("w1", "m1", SignalType::Buy, 50.0, 0.8);
        let (allowed, reason) = r.pre_trade_check(&signal, 0.01).await.unwrap();
        assert!(!allowed);
        assert!(reason.contains("insufficient balance"));
    }

    #[tokio::test]
    async fn passes_when_all_clear() {
        let r = rails(Mode::Live).await;
        let signal = Signal::new("w1", "m1", SignalType::Buy, 50.0, 0.8);
        let (allowed, _) = r.pre_trade_check(&signal, 10.0).await.unwrap();
        assert!(allowed);
    }

    #[tokio::test]
    async fn position_size_scales_with_confidence_and_floors_at_minimum() {
        let r = SafetyRails {
            store: Store::connect_in_memory().await,
            control: TradingControl::new(Mode::Live),
            risk: risk(),
            base_position_native: 1.0,
            max_position_size_native: 2.0,
        };
        assert_eq!(r.calculate_position_size(0.9, 100.0), 1.0);
        assert_eq!(r.calculate_position_size(0.65, 100.0), 0.8);
        assert_eq!(r.calculate_position_size(0.4, 0.001), 0.001);
    }
}
