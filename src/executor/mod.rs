/// Turns a validated signal into a trade, grounded in
/// `original_source/trader/trade_executor.py`'s `handle_signal`/
/// `_execute_buy`/`_dry_run_buy`/`execute_sell` flow; style (instrumented
/// async methods, failure logged and persisted rather than propagated)
/// follows `strike/executor.rs`.
use crate::chain::ChainAdapter;
use crate::config::TradingControl;
use crate::error::AppResult;
use crate::notifier::TelegramNotifier;
use crate::position_manager::{exit_rules_for, PositionSeller};
use crate::safety::SafetyRails;
use crate::store::Store;
use crate::swap::{SwapAdapter, SwapOutcome};
use crate::types::{Mode, Position, PositionStatus, SourceType, Trade, TradeSide, TradeStatus};
use crate::validator::ValidatedSignal;
use async_trait::async_trait;
use chrono::Utc;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use std::sync::Arc;
use tracing::{info, instrument, warn};

const WRAPPED_NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";
const LAMPORTS_PER_NATIVE: f64 = 1_000_000_000.0;

pub struct TradeExecutor {
    store: Store,
    chain: Arc<dyn ChainAdapter>,
    swap: Arc<dyn SwapAdapter>,
    control: TradingControl,
    safety: SafetyRails,
    signer: Arc<Keypair>,
    notifier: Arc<TelegramNotifier>,
    default_slippage_bps: u32,
    confirm_timeout_secs: u64,
    sol_usd_reference_rate: f64,
}

impl TradeExecutor {
    pub fn new(
        store: Store,
        chain: Arc<dyn ChainAdapter>,
        swap: Arc<dyn SwapAdapter>,
        control: TradingControl,
        safety: SafetyRails,
        signer: Arc<Keypair>,
        notifier: Arc<TelegramNotifier>,
        default_slippage_bps: u32,
        confirm_timeout_secs: u64,
        sol_usd_reference_rate: f64,
    ) -> Self {
        Self { store, chain, swap, control, safety, signer, notifier, default_slippage_bps, confirm_timeout_secs, sol_usd_reference_rate }
    }

    async fn signer_balance(&self) -> AppResult<f64> {
        let pubkey = self.signer.pubkey().to_string();
        self.chain.get_native_balance(&pubkey).await
    }

    /// Dispatches by current mode. Returns `Ok(None)` for alert-only and
    /// for signals the safety rails reject; never returns `Err` for a
    /// rejected trade, only for genuine I/O/storage failures.
    #[instrument(skip(self, validated), fields(mint = %validated.token.mint))]
    pub async fn handle_signal(&self, validated: &ValidatedSignal) -> AppResult<Option<i64>> {
        match self.control.mode() {
            Mode::AlertOnly => {
                info!(mint = %validated.token.mint, "alert-only mode: signal logged, no trade");
                Ok(None)
            }
            Mode::DryRun => self.dry_run_buy(validated).await,
            Mode::Live => self.execute_buy(validated).await,
        }
    }

    async fn execute_buy(&self, validated: &ValidatedSignal) -> AppResult<Option<i64>> {
        let signal = &validated.signal;
        let balance_native = self.signer_balance().await?;

        let (allowed, reason) = self.safety.pre_trade_check(signal, balance_native).await?;
        if !allowed {
            warn!(reason, "safety rails rejected buy");
            if let Some(id) = signal.id {
                self.store.mark_signal_skipped(id, &reason).await?;
            }
            self.notifier.notify_skip(&validated.token.symbol, &reason).await;
            return Ok(None);
        }

        let size_native = self.safety.calculate_position_size(validated.signal.confidence, balance_native);
        let amount_atomic = (size_native * LAMPORTS_PER_NATIVE) as u64;

        let mut trade = Trade::new_pending(validated.token.mint.clone(), TradeSide::Buy, size_native);
        trade.triggering_wallet = Some(signal.wallet_address.clone());
        trade.signal_id = signal.id;

        let Some(quote) = self
            .swap
            .quote(WRAPPED_NATIVE_MINT, &validated.token.mint, amount_atomic, self.default_slippage_bps)
            .await?
        else {
            trade.status = TradeStatus::Failed;
            trade.error_message = Some("no swap route available".to_string());
            let trade_id = self.store.insert_trade(&trade).await?;
            if let Some(id) = signal.id {
                self.store.mark_signal_skipped(id, "no swap route").await?;
            }
            return Ok(Some(trade_id));
        };

        let tx_handle = match self.swap.execute(&quote, &self.signer).await {
            Ok(handle) => handle,
            Err(e) => {
                trade.status = TradeStatus::Failed;
                trade.error_message = Some(e.to_string());
                let trade_id = self.store.insert_trade(&trade).await?;
                if let Some(id) = signal.id {
                    self.store.mark_signal_skipped(id, "swap execution failed").await?;
                }
                return Ok(Some(trade_id));
            }
        };

        let confirmation = self.swap.confirm(&tx_handle, self.confirm_timeout_secs).await?;
        let confirmed = confirmation.outcome == SwapOutcome::Confirmed;

        trade.status = if confirmed { TradeStatus::Confirmed } else { TradeStatus::Unconfirmed };
        trade.tx_handle = Some(tx_handle);
        trade.amount_tokens = quote.out_amount as f64 / 1_000_000.0;
        trade.price_usd = validated.token.price_usd;
        let trade_id = self.store.insert_trade(&trade).await?;

        if let Some(id) = signal.id {
            self.store.mark_signal_executed(id, trade_id).await?;
        }

        if confirmed {
            self.open_position(validated, size_native, trade.amount_tokens).await?;
            self.safety.post_trade_check().await?;
        }

        let status = if confirmed { "confirmed" } else { "unconfirmed" };
        self.notifier
            .notify_buy(&validated.token.symbol, size_native, validated.token.price_usd, &signal.wallet_address, status)
            .await;

        Ok(Some(trade_id))
    }

    async fn dry_run_buy(&self, validated: &ValidatedSignal) -> AppResult<Option<i64>> {
        let signal = &validated.signal;
        info!(mint = %validated.token.mint, size = validated.position_size_native, "DRY_RUN_BUY");

        let mut trade = Trade::new_pending(validated.token.mint.clone(), TradeSide::Buy, validated.position_size_native);
        trade.triggering_wallet = Some(signal.wallet_address.clone());
        trade.signal_id = signal.id;
        trade.status = TradeStatus::DryRun;
        trade.price_usd = validated.token.price_usd;

        let tokens_received = if validated.token.price_usd > 0.0 {
            validated.position_size_native * self.sol_usd_reference_rate / validated.token.price_usd
        } else {
            0.0
        };
        trade.amount_tokens = tokens_received;

        let trade_id = self.store.insert_trade(&trade).await?;
        if let Some(id) = signal.id {
            self.store.mark_signal_executed(id, trade_id).await?;
        }

        // $0 positions are useless to track; skip opening one.
        if validated.token.price_usd > 0.0 {
            self.open_position(validated, validated.position_size_native, tokens_received).await?;
        }

        self.notifier
            .notify_buy(&validated.token.symbol, validated.position_size_native, validated.token.price_usd, &signal.wallet_address, "dry_run")
            .await;

        Ok(Some(trade_id))
    }

    async fn open_position(&self, validated: &ValidatedSignal, invested_native: f64, tokens_held: f64) -> AppResult<()> {
        let rules = exit_rules_for(validated.source_type);
        let now = Utc::now();
        let position = Position {
            id: None,
            mint: validated.token.mint.clone(),
            entry_price_usd: validated.token.price_usd,
            current_price_usd: validated.token.price_usd,
            invested_native,
            tokens_held,
            take_profit_ladder: rules.tp_ladder,
            stop_loss_price_usd: validated.token.price_usd * rules.sl_multiplier,
            triggering_wallet: Some(validated.signal.wallet_address.clone()),
            status: PositionStatus::Open,
            close_reason: None,
            realized_pnl_native: 0.0,
            unrealized_pnl_native: 0.0,
            source_type: validated.source_type,
            opened_at: now,
            closed_at: None,
            last_checked_at: now,
        };
        self.store.open_position(&position).await?;
        Ok(())
    }
}

#[async_trait]
impl PositionSeller for TradeExecutor {
    #[instrument(skip(self, position), fields(mint = %position.mint, fraction))]
    async fn sell(&self, position: &Position, fraction: f64, reason: &str) -> AppResult<()> {
        let fraction = fraction.clamp(0.0, 1.0);
        let tokens_to_sell = position.tokens_held * fraction;
        if tokens_to_sell <= 0.0 {
            return Ok(());
        }

        let id = position.id.expect("position passed to sell always has an id");
        let is_full_close = fraction >= 0.999;

        match self.control.mode() {
            Mode::DryRun | Mode::AlertOnly => {
                let price = if position.current_price_usd > 0.0 { position.current_price_usd } else { position.entry_price_usd };
                let multiplier = if position.entry_price_usd > 0.0 { price / position.entry_price_usd } else { 1.0 };
                let mut trade = Trade::new_pending(position.mint.clone(), TradeSide::Sell, 0.0);
                trade.status = TradeStatus::DryRun;
                trade.sell_reason = Some(reason.to_string());
                trade.price_usd = price;
                trade.amount_tokens = tokens_to_sell;
                trade.triggering_wallet = position.triggering_wallet.clone();

                if is_full_close {
                    let simulated_pnl = position.invested_native * (multiplier - 1.0);
                    trade.amount_native = position.invested_native + simulated_pnl;
                    self.store.insert_trade(&trade).await?;
                    self.store.close_position(id, reason, simulated_pnl).await?;
                    self.notifier.notify_sell(&position.mint, reason, simulated_pnl).await;
                } else {
                    trade.amount_native = position.invested_native * fraction * multiplier;
                    self.store.insert_trade(&trade).await?;
                    self.apply_partial_sell(position, tokens_to_sell).await?;
                }
                info!(mint = %position.mint, fraction, reason, "DRY_RUN_SELL");
                return Ok(());
            }
            Mode::Live => {}
        }

        let amount_atomic = (tokens_to_sell * 1_000_000.0) as u64;
        let Some(quote) = self.swap.quote(&position.mint, WRAPPED_NATIVE_MINT, amount_atomic, self.default_slippage_bps).await? else {
            warn!(mint = %position.mint, "sell quote unavailable, will retry next tick");
            return Ok(());
        };

        let tx_handle = match self.swap.execute(&quote, &self.signer).await {
            Ok(h) => h,
            Err(e) => {
                warn!(mint = %position.mint, error = %e, "sell execution failed, will retry next tick");
                return Ok(());
            }
        };

        let confirmation = self.swap.confirm(&tx_handle, self.confirm_timeout_secs).await?;
        let confirmed = confirmation.outcome == SwapOutcome::Confirmed;
        let sol_received = quote.out_amount as f64 / LAMPORTS_PER_NATIVE;

        let mut trade = Trade::new_pending(position.mint.clone(), TradeSide::Sell, sol_received);
        trade.status = if confirmed { TradeStatus::Confirmed } else { TradeStatus::Unconfirmed };
        trade.sell_reason = Some(reason.to_string());
        trade.tx_handle = Some(tx_handle);
        trade.amount_tokens = tokens_to_sell;
        trade.price_usd = if position.current_price_usd > 0.0 { position.current_price_usd } else { position.entry_price_usd };
        trade.triggering_wallet = position.triggering_wallet.clone();
        self.store.insert_trade(&trade).await?;

        if !confirmed {
            return Ok(());
        }

        if is_full_close {
            let realized = sol_received - position.invested_native;
            self.store.close_position(id, reason, realized).await?;
            self.notifier.notify_sell(&position.mint, reason, realized).await;
        } else {
            self.apply_partial_sell(position, tokens_to_sell).await?;
        }

        self.safety.post_trade_check().await?;
        Ok(())
    }
}

impl TradeExecutor {
    /// Reduces `tokens_held` and marks the first unhit level whose
    /// multiplier triggered this sell, so it never re-fires.
    async fn apply_partial_sell(&self, position: &Position, tokens_sold: f64) -> AppResult<()> {
        let id = position.id.expect("position passed to sell always has an id");
        let remaining = (position.tokens_held - tokens_sold).max(0.0);
        let multiplier = position.multiplier();

        let mut ladder = position.take_profit_ladder.clone();
        for level in ladder.iter_mut() {
            if !level.hit && multiplier >= level.multiplier {
                level.hit = true;
                break;
            }
        }
        self.store.record_partial_sell(id, remaining, &ladder).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SafetyFlags, Signal, SignalType, Token};
    use chrono::Utc;

    fn token(price: f64) -> Token {
        Token {
            mint: "MINT".to_string(),
            symbol: "TKN".to_string(),
            name: "Token".to_string(),
            market_cap_usd: 1_000_000.0,
            price_usd: price,
            volume_24h_usd: 10_000.0,
            liquidity_usd: 50_000.0,
            holder_count: 500,
            price_multiplier: 1.0,
            safety: SafetyFlags::default(),
        }
    }

    fn position(entry: f64, current: f64, ladder: Vec<crate::types::TakeProfitLevel>) -> Position {
        let now = Utc::now();
        Position {
            id: Some(1),
            mint: "MINT".to_string(),
            entry_price_usd: entry,
            current_price_usd: current,
            invested_native: 1.0,
            tokens_held: 1000.0,
            take_profit_ladder: ladder,
            stop_loss_price_usd: entry * 0.6,
            triggering_wallet: Some("w1".to_string()),
            status: PositionStatus::Open,
            close_reason: None,
            realized_pnl_native: 0.0,
            unrealized_pnl_native: 0.0,
            source_type: SourceType::Human,
            opened_at: now,
            closed_at: None,
            last_checked_at: now,
        }
    }

    fn validated(price: f64) -> ValidatedSignal {
        ValidatedSignal {
            signal: Signal::new("w1", "MINT", SignalType::Buy, 60.0, 0.8),
            token: token(price),
            source_type: SourceType::Human,
            position_size_native: 0.1,
        }
    }

    #[test]
    fn dry_run_skips_zero_price_tokens() {
        let v = validated(0.0);
        // mirrors the "skip — $0 positions are useless" rule checked in dry_run_buy
        assert_eq!(v.token.price_usd, 0.0);
    }

    #[test]
    fn partial_sell_marks_only_first_unhit_triggered_level() {
        use crate::types::TakeProfitLevel;
        let mut ladder = vec![TakeProfitLevel::new(2.0, 0.5), TakeProfitLevel::new(4.0, 0.5)];
        let multiplier = 2.0_f64 / 1.0_f64;
        for level in ladder.iter_mut() {
            if !level.hit && multiplier >= level.multiplier {
                level.hit = true;
                break;
            }
        }
        assert!(ladder[0].hit);
        assert!(!ladder[1].hit);
    }

    #[test]
    fn full_close_computes_realized_pnl_from_sol_received() {
        let invested = 1.0;
        let sol_received = 2.5;
        assert_eq!(sol_received - invested, 1.5);
    }

    #[test]
    fn position_fixture_builds() {
        use crate::types::TakeProfitLevel;
        let p = position(1.0, 2.0, vec![TakeProfitLevel::new(2.0, 0.5)]);
        assert_eq!(p.multiplier(), 2.0);
    }
}
