/// Long-running monitor loop over the top-scoring monitored wallets,
/// grounded in `stalker/monitor.rs`'s polling-loop shape (batches of
/// wallets, per-poll stats, handler dispatch) generalized from account
/// balance diffing to parsed-swap buy-signal detection.
use crate::chain::{ChainAdapter, ParsedTransaction};
use crate::config::{MonitorConfig, TradingControl};
use crate::error::AppResult;
use crate::store::Store;
use crate::types::{Signal, SignalType, Wallet};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

const WRAPPED_NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";
const SIGNATURE_PAGE_SIZE: usize = 50;

/// Invoked once per emitted signal. Handler failures are logged and must
/// never stop the monitor loop.
#[async_trait]
pub trait SignalHandler: Send + Sync {
    async fn handle(&self, signal: &Signal) -> AppResult<()>;
}

struct Dedup {
    order: VecDeque<(String, String)>,
    seen: HashSet<(String, String)>,
    cap: usize,
}

impl Dedup {
    fn new(cap: usize) -> Self {
        Self { order: VecDeque::new(), seen: HashSet::new(), cap }
    }

    /// Returns `true` if `(wallet, mint)` is new and was inserted.
    fn check_and_insert(&mut self, wallet: &str, mint: &str) -> bool {
        let key = (wallet.to_string(), mint.to_string());
        if self.seen.contains(&key) {
            return false;
        }
        self.order.push_back(key.clone());
        self.seen.insert(key);
        if self.order.len() > self.cap {
            let drop_count = self.order.len() / 2;
            for _ in 0..drop_count {
                if let Some(old) = self.order.pop_front() {
                    self.seen.remove(&old);
                }
            }
        }
        true
    }
}

pub struct WalletMonitor {
    chain: Arc<dyn ChainAdapter>,
    store: Store,
    control: TradingControl,
    config: MonitorConfig,
    handler: Arc<dyn SignalHandler>,
    dedup: Mutex<Dedup>,
}

impl WalletMonitor {
    pub fn new(
        chain: Arc<dyn ChainAdapter>,
        store: Store,
        control: TradingControl,
        config: MonitorConfig,
        handler: Arc<dyn SignalHandler>,
    ) -> Self {
        let dedup = Mutex::new(Dedup::new(config.dedup_cap));
        Self { chain, store, control, config, handler, dedup }
    }

    /// Runs forever at `config.tick_interval_secs` cadence. Never
    /// returns; a tick failure is logged and the loop continues.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.tick_interval_secs));
        loop {
            interval.tick().await;
            match self.tick().await {
                Ok(0) => {}
                Ok(n) => info!(signals_emitted = n, "monitor tick complete"),
                Err(e) => error!(error = %e, "monitor tick failed"),
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn tick(&self) -> AppResult<usize> {
        if self.control.is_killed() {
            debug!("kill switch engaged, skipping monitor tick");
            return Ok(0);
        }

        let wallets = self.store.monitored_wallets().await?;
        let mut emitted = 0;
        for (i, wallet) in wallets.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.wallet_spacing_ms)).await;
            }
            match self.poll_wallet(wallet).await {
                Ok(n) => emitted += n,
                Err(e) => warn!(wallet = %wallet.address, error = %e, "wallet poll failed"),
            }
        }
        Ok(emitted)
    }

    async fn poll_wallet(&self, wallet: &Wallet) -> AppResult<usize> {
        let last_seen = self.store.get_last_seen_signature(&wallet.address).await?;
        let sigs = self.chain.list_signatures(&wallet.address, SIGNATURE_PAGE_SIZE, None).await?;
        if sigs.is_empty() {
            return Ok(0);
        }

        let mut new_sigs = Vec::new();
        for s in &sigs {
            if last_seen.as_deref() == Some(s.signature.as_str()) {
                break;
            }
            new_sigs.push(s.clone());
        }
        if new_sigs.is_empty() {
            return Ok(0);
        }

        self.store.set_last_seen_signature(&wallet.address, &new_sigs[0].signature).await?;
        new_sigs.reverse(); // chain order: oldest new tx first

        let signatures: Vec<String> = new_sigs.iter().map(|s| s.signature.clone()).collect();
        let parsed = self.chain.parse_transactions(&signatures).await?;

        let mut emitted = 0;
        for tx in &parsed {
            if tx.err.is_some() || tx.fee_payer != wallet.address {
                continue;
            }
            let Some((mint, spent_native)) = Self::detect_buy(wallet, tx) else { continue };

            let is_new = self.dedup.lock().expect("dedup mutex poisoned").check_and_insert(&wallet.address, &mint);
            if !is_new {
                continue;
            }

            let score = wallet.total_score();
            let confidence = Self::confidence(score, spent_native);
            let mut signal = Signal::new(wallet.address.clone(), mint, SignalType::Buy, score, confidence);
            let id = self.store.insert_signal(&signal).await?;
            signal.id = Some(id);

            if let Err(e) = self.handler.handle(&signal).await {
                warn!(error = %e, signal_id = id, "signal handler failed, continuing");
            }
            emitted += 1;
        }
        Ok(emitted)
    }

    fn detect_buy(wallet: &Wallet, tx: &ParsedTransaction) -> Option<(String, f64)> {
        let bought = tx.token_transfers.iter().find(|t| t.to == wallet.address && t.mint != WRAPPED_NATIVE_MINT)?;
        let spent_native: f64 = tx
            .native_transfers
            .iter()
            .filter(|n| n.from == wallet.address)
            .map(|n| n.lamports as f64 / 1_000_000_000.0)
            .sum();
        if spent_native <= 0.0 {
            return None;
        }
        Some((bought.mint.clone(), spent_native))
    }

    fn confidence(wallet_score: f64, spent_native: f64) -> f64 {
        let size_bonus = if spent_native >= 5.0 {
            0.2
        } else if spent_native >= 1.0 {
            0.15
        } else if spent_native >= 0.5 {
            0.1
        } else {
            0.0
        };
        (0.5 + 0.3 * wallet_score / 100.0 + size_bonus).clamp(0.5, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{NativeTransfer, TokenTransfer};
    use crate::types::{WalletEnrichment, WalletSource, WalletStats, WalletSubScores};
    use chrono::Utc;

    fn wallet(score: f64) -> Wallet {
        let now = Utc::now();
        Wallet {
            address: "w1".to_string(),
            scores: WalletSubScores { pnl_score: score, win_rate_score: 0.0, timing_score: 0.0, consistency_score: 0.0 },
            stats: WalletStats::default(),
            enrichment: WalletEnrichment::default(),
            tags: vec![],
            is_flagged: false,
            flag_reason: None,
            is_monitored: true,
            source: WalletSource::Manual,
            first_seen_at: now,
            last_active_at: now,
            score_updated_at: now,
        }
    }

    fn tx(from: &str, to: &str, lamports: u64, mint_to: &str, mint: &str) -> ParsedTransaction {
        ParsedTransaction {
            signature: "sig".to_string(),
            tx_type: "SWAP".to_string(),
            fee_payer: from.to_string(),
            timestamp: Utc::now(),
            token_transfers: vec![TokenTransfer { mint: mint.to_string(), from: "pool".to_string(), to: mint_to.to_string(), amount: 100.0 }],
            native_transfers: vec![NativeTransfer { from: from.to_string(), to: to.to_string(), lamports }],
            instruction_descriptions: vec![],
            err: None,
        }
    }

    #[test]
    fn confidence_stays_in_half_to_one() {
        assert!((0.5..=1.0).contains(&WalletMonitor::confidence(0.0, 0.0)));
        assert!((0.5..=1.0).contains(&WalletMonitor::confidence(100.0, 10.0)));
    }

    #[test]
    fn confidence_scales_with_score_and_size() {
        let low = WalletMonitor::confidence(0.0, 0.0);
        let high = WalletMonitor::confidence(100.0, 10.0);
        assert!(high > low);
        assert_eq!(low, 0.5);
        assert_eq!(high, 1.0);
    }

    #[test]
    fn detect_buy_requires_non_wrapped_inflow_and_native_outflow() {
        let w = wallet(50.0);
        let t = tx("w1", "pool", 1_000_000_000, "w1", "MINT123");
        let detected = WalletMonitor::detect_buy(&w, &t);
        assert_eq!(detected, Some(("MINT123".to_string(), 1.0)));
    }

    #[test]
    fn detect_buy_ignores_wrapped_native_inflow() {
        let w = wallet(50.0);
        let t = tx("w1", "pool", 1_000_000_000, "w1", WRAPPED_NATIVE_MINT);
        assert_eq!(WalletMonitor::detect_buy(&w, &t), None);
    }

    #[test]
    fn detect_buy_requires_outflow_from_wallet() {
        let w = wallet(50.0);
        let mut t = tx("w1", "pool", 1_000_000_000, "w1", "MINT123");
        t.native_transfers.clear();
        assert_eq!(WalletMonitor::detect_buy(&w, &t), None);
    }

    #[test]
    fn dedup_blocks_repeat_pair_until_eviction() {
        let mut d = Dedup::new(4);
        assert!(d.check_and_insert("w1", "m1"));
        assert!(!d.check_and_insert("w1", "m1"));
        assert!(d.check_and_insert("w1", "m2"));
        assert!(d.check_and_insert("w1", "m3"));
        // fifth insert pushes len to 5 > cap(4), evicts oldest half (2 entries)
        assert!(d.check_and_insert("w1", "m4"));
        assert!(d.check_and_insert("w1", "m1"));
    }
}
