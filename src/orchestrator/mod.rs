/// Top-level composition root, grounded in `handlers/mod.rs`'s
/// `SystemOrchestrator::init`/`start`/`shutdown` shape, generalized from
/// a fixed handler list to this pipeline's adapters and tasks.
use crate::brain::AgentBrain;
use crate::chain::{ChainAdapter, RpcChainAdapter};
use crate::cluster::{ClusterDetector, ClusterSummary};
use crate::config::{Config, ConfigManager, TradingControl};
use crate::discovery::{DiscoverySource, TokenDiscovery};
use crate::error::{AppError, AppResult};
use crate::executor::TradeExecutor;
use crate::market_data::{CompositeMarketDataAdapter, DexScreenerProvider, MarketDataAdapter};
use crate::monitor::{SignalHandler, WalletMonitor};
use crate::notifier::{ChatBot, TelegramNotifier};
use crate::position_manager::{PositionManager, PositionSeller};
use crate::safety::SafetyRails;
use crate::scoring::{RefreshSummary, WalletRefresher};
use crate::store::Store;
use crate::swap::{JupiterSwapAdapter, SwapAdapter};
use crate::types::{Signal, Wallet};
use crate::validator::SignalValidator;
use async_trait::async_trait;
use solana_sdk::signature::{Keypair, Signer};
use std::sync::Arc;
use tracing::{info, warn};

/// Bridges the Monitor's raw signals into the Validator then the
/// Executor, so neither module needs to know about the other.
struct SignalPipeline {
    store: Store,
    validator: Arc<SignalValidator>,
    executor: Arc<TradeExecutor>,
    brain: Arc<AgentBrain>,
    notifier: Arc<TelegramNotifier>,
}

#[async_trait]
impl SignalHandler for SignalPipeline {
    async fn handle(&self, signal: &Signal) -> AppResult<()> {
        let Some(wallet) = self.store.get_wallet(&signal.wallet_address).await? else {
            warn!(wallet = %signal.wallet_address, "signal from an unknown wallet, dropping");
            return Ok(());
        };
        let strategy = self.brain.strategy_snapshot();

        let outcome = self.validator.validate(signal, &wallet, &strategy).await?;
        if !outcome.should_trade {
            let reason = outcome.skip_reason.unwrap_or_else(|| "validator rejected".to_string());
            if let Some(id) = signal.id {
                self.store.mark_signal_skipped(id, &reason).await?;
            }
            self.notifier.notify_skip(&signal.token_mint, &reason).await;
            return Ok(());
        }

        let validated = outcome.validated.expect("should_trade implies validated is set");
        self.executor.handle_signal(&validated).await?;
        Ok(())
    }
}

/// Owns every adapter and component and wires them together; `start()`
/// runs the long-lived tasks named in spec §5 until cancelled.
pub struct Orchestrator {
    config_manager: ConfigManager,
    store: Store,
    chain: Arc<dyn ChainAdapter>,
    market_data: Arc<dyn MarketDataAdapter>,
    control: TradingControl,
    notifier: Arc<TelegramNotifier>,
    monitor: Arc<WalletMonitor>,
    position_manager: Arc<PositionManager>,
    brain: Arc<AgentBrain>,
    chat_bot: Arc<ChatBot>,
    cluster_detector: ClusterDetector,
    wallet_refresher: WalletRefresher,
    discovery: TokenDiscovery,
}

fn load_signer(mode_is_live: bool) -> AppResult<Arc<Keypair>> {
    match std::env::var("SOLANA_SIGNER_KEYPAIR").ok().filter(|s| !s.is_empty()) {
        Some(encoded) => {
            let bytes = bs58::decode(&encoded).into_vec().map_err(|e| AppError::ConfigInvalid(format!("SOLANA_SIGNER_KEYPAIR is not valid base58: {e}")))?;
            let keypair = Keypair::from_bytes(&bytes).map_err(|e| AppError::ConfigInvalid(format!("SOLANA_SIGNER_KEYPAIR is not a valid keypair: {e}")))?;
            Ok(Arc::new(keypair))
        }
        None if mode_is_live => Err(AppError::ConfigInvalid("live mode requires SOLANA_SIGNER_KEYPAIR".to_string())),
        None => {
            info!("SOLANA_SIGNER_KEYPAIR not set, generating an ephemeral signer (non-live mode only)");
            Ok(Arc::new(Keypair::new()))
        }
    }
}

/// CLI-level overrides applied on top of the config file, so flags like
/// `--dry-run`/`--mode`/`--no-enrich` don't require editing the TOML.
#[derive(Debug, Clone, Default)]
pub struct InitOverrides {
    pub mode: Option<crate::types::Mode>,
    pub no_enrich: bool,
}

impl Orchestrator {
    pub async fn init(config_path: &str) -> AppResult<Self> {
        Self::init_with(config_path, InitOverrides::default()).await
    }

    pub async fn init_with(config_path: &str, overrides: InitOverrides) -> AppResult<Self> {
        info!("initializing trading system");

        let config_manager = ConfigManager::new(config_path).map_err(|e| AppError::ConfigInvalid(e.to_string()))?;
        let mut config: Config = config_manager.get_config();
        let mut mode = config.mode()?;
        if let Some(m) = overrides.mode {
            mode = m;
        }
        if overrides.no_enrich {
            config.discovery.enrich_price_multiplier = false;
        }

        let store = Store::connect(&config.store.database_path).await?;
        let control = TradingControl::new(mode);
        let notifier = Arc::new(TelegramNotifier::from_env());

        let chain: Arc<dyn ChainAdapter> = Arc::new(RpcChainAdapter::new(
            &config.chain.rpc_endpoint,
            &config.chain.commitment,
            config.chain.max_retries,
            config.chain.batch_size,
            config.chain.inter_batch_delay_ms,
        ));
        let swap: Arc<dyn SwapAdapter> = Arc::new(JupiterSwapAdapter::new(&config.swap.aggregator_base_url, Arc::clone(&chain)));
        let market_data: Arc<dyn MarketDataAdapter> =
            Arc::new(CompositeMarketDataAdapter::new(vec![Box::new(DexScreenerProvider::new())]));

        let signer = load_signer(mode == crate::types::Mode::Live)?;
        info!(pubkey = %signer.pubkey(), "signer loaded");

        let safety = SafetyRails::new(
            store.clone(),
            control.clone(),
            config.risk.clone(),
            config.validator.base_position_native,
            config.validator.max_position_size_native,
        );

        let executor = Arc::new(TradeExecutor::new(
            store.clone(),
            Arc::clone(&chain),
            Arc::clone(&swap),
            control.clone(),
            safety,
            signer,
            Arc::clone(&notifier),
            config.swap.default_slippage_bps,
            config.swap.confirm_timeout_secs,
            config.scoring.sol_usd_reference_rate,
        ));

        let position_manager = Arc::new(PositionManager::new(
            store.clone(),
            Arc::clone(&market_data),
            Arc::clone(&executor) as Arc<dyn PositionSeller>,
            config.position.poll_interval_secs,
        ));

        let brain = Arc::new(AgentBrain::new(
            store.clone(),
            control.clone(),
            Arc::clone(&executor),
            Arc::clone(&market_data),
            config.risk.clone(),
            config.brain.clone(),
            config.store.strategy_path.clone(),
            config.validator.base_position_native,
            config.validator.max_position_size_native,
        ));

        let validator = Arc::new(SignalValidator::new(
            store.clone(),
            Arc::clone(&swap),
            Arc::clone(&market_data),
            control.clone(),
            config.validator.clone(),
            config.risk.clone(),
            config.scoring.bot_speed_trades_per_day,
        ));

        let pipeline = Arc::new(SignalPipeline {
            store: store.clone(),
            validator,
            executor: Arc::clone(&executor),
            brain: Arc::clone(&brain),
            notifier: Arc::clone(&notifier),
        });

        let monitor = Arc::new(WalletMonitor::new(
            Arc::clone(&chain),
            store.clone(),
            control.clone(),
            config.monitor.clone(),
            pipeline as Arc<dyn SignalHandler>,
        ));

        let chat_bot = Arc::new(ChatBot::new(store.clone(), control.clone()));

        let cluster_detector = ClusterDetector::new(Arc::clone(&chain), store.clone(), config.cluster.clone());
        let wallet_refresher = WalletRefresher::new(store.clone(), config.scoring.clone());

        // No concrete DiscoverySource providers are wired yet — `run_discovery_once`
        // always reports zero candidates until a source adapter lands.
        let sources: Vec<Box<dyn DiscoverySource>> = Vec::new();
        let discovery = TokenDiscovery::new(sources, Arc::clone(&market_data), store.clone(), config.discovery.clone());

        info!("all system components initialized");

        Ok(Self {
            config_manager,
            store,
            chain,
            market_data,
            control,
            notifier,
            monitor,
            position_manager,
            brain,
            chat_bot,
            cluster_detector,
            wallet_refresher,
            discovery,
        })
    }

    /// Runs the Monitor, Position Manager, Brain cycle/learn, and Chat Bot
    /// as independent tasks until the process is cancelled (spec §5).
    pub async fn run_background_tasks(&self) {
        self.config_manager.start_hot_reload();
        info!("starting background services");

        let monitor = Arc::clone(&self.monitor);
        let position_manager = Arc::clone(&self.position_manager);
        let brain_cycle = Arc::clone(&self.brain);
        let brain_learn = Arc::clone(&self.brain);
        let chat_bot = Arc::clone(&self.chat_bot);

        let _ = tokio::join!(
            async move { monitor.run().await },
            async move { position_manager.run().await },
            async move { brain_cycle.run_cycle_loop().await },
            async move { brain_learn.run_learn_loop().await },
            async move { chat_bot.run().await },
        );
    }

    pub async fn run_discovery_once(&self) -> AppResult<usize> {
        self.discovery.run_once().await
    }

    pub async fn run_wallet_refresh_once(&self) -> AppResult<RefreshSummary> {
        self.wallet_refresher.refresh().await
    }

    pub async fn run_cluster_detection(&self, seed: &str) -> AppResult<Option<ClusterSummary>> {
        self.cluster_detector.analyze_seed(seed).await
    }

    pub async fn wipe_wallets(&self) -> AppResult<u64> {
        Ok(self.store.wipe_wallets().await?)
    }

    pub async fn add_wallet(&self, address: &str, monitored: bool, source: crate::types::WalletSource) -> AppResult<()> {
        let now = chrono::Utc::now();
        let wallet = Wallet {
            address: address.to_string(),
            scores: Default::default(),
            stats: Default::default(),
            enrichment: Default::default(),
            tags: vec![],
            is_flagged: false,
            flag_reason: None,
            is_monitored: monitored,
            source,
            first_seen_at: now,
            last_active_at: now,
            score_updated_at: now,
        };
        self.store.upsert_wallet(&wallet).await?;
        Ok(())
    }

    /// Bulk-imports one address per line (blank lines and `#` comments
    /// skipped), grounded in the smart-money wallet list the original
    /// bot seeded itself from on startup.
    pub async fn import_smart_money(&self, path: &str) -> AppResult<usize> {
        let content = std::fs::read_to_string(path)?;
        let mut count = 0;
        for line in content.lines() {
            let address = line.trim();
            if address.is_empty() || address.starts_with('#') {
                continue;
            }
            self.add_wallet(address, true, crate::types::WalletSource::Gmgn).await?;
            count += 1;
        }
        Ok(count)
    }

    pub async fn status_report(&self) -> String {
        let strategy = self.brain.strategy_snapshot();
        let open_positions = self.store.get_open_positions().await.map(|p| p.len()).unwrap_or(0);
        let monitored = self.store.monitored_wallets().await.map(|w| w.len()).unwrap_or(0);
        format!(
            "mode: {:?}{}\nmonitored wallets: {monitored}\nopen positions: {open_positions}\nagent: {}",
            self.control.mode(),
            if self.control.is_killed() { " [PAUSED]" } else { "" },
            strategy.summary(),
        )
    }

    /// Best-effort shutdown; the store's connection pool and adapters'
    /// HTTP clients close on drop, so there's nothing left to flush here
    /// beyond acknowledging the request.
    pub async fn shutdown(&self) {
        info!("shutting down trading system");
        let _ = &self.chain;
        let _ = &self.market_data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_signer_without_env_var_is_non_fatal_outside_live() {
        std::env::remove_var("SOLANA_SIGNER_KEYPAIR");
        assert!(load_signer(false).is_ok());
    }

    #[test]
    fn load_signer_without_env_var_is_fatal_in_live_mode() {
        std::env::remove_var("SOLANA_SIGNER_KEYPAIR");
        assert!(load_signer(true).is_err());
    }
}
